use core::fmt;

use crate::model::{NodeHandle, TreeStoreManager};
use crate::runtime::{Error, ErrorCode};

mod sequence;

pub use sequence::{NodeCursor, NodeSequence, NodeSequenceIter};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self {
            ns_uri,
            local: local.into(),
        }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self::new(None, local)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone)]
pub enum Value {
    NodeSet(NodeSequence),
    String(String),
    Number(f64),
    Boolean(bool),
    /// Root (document node) of a constructed result tree fragment.
    Fragment(NodeHandle),
}

impl From<NodeSequence> for Value {
    fn from(s: NodeSequence) -> Self {
        Value::NodeSet(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::NodeSet(_) => "node-set",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Fragment(_) => "result tree fragment",
        }
    }

    /// Copy safe to hand out to a caller: node sets get a rewound cursor.
    pub fn fresh(&self) -> Value {
        match self {
            Value::NodeSet(s) => Value::NodeSet(s.clone_with_reset()),
            other => other.clone(),
        }
    }

    pub fn to_boolean(&self) -> Result<bool, Error> {
        Ok(match self {
            Value::NodeSet(s) => {
                let mut s = s.clone_with_reset();
                if s.should_cache_nodes() {
                    s.item(0)?.is_some()
                } else {
                    s.next_node().is_some()
                }
            }
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::Fragment(_) => true,
        })
    }

    pub fn to_number(&self, stores: &TreeStoreManager) -> Result<f64, Error> {
        Ok(match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => parse_number(&other.to_string_value(stores)?),
        })
    }

    /// XPath `string()` conversion; a node set yields its first node's value.
    pub fn to_string_value(&self, stores: &TreeStoreManager) -> Result<String, Error> {
        Ok(match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
            Value::Fragment(h) => stores.string_value(*h),
            Value::NodeSet(s) => {
                let mut s = s.clone_with_reset();
                s.next_node()
                    .map(|h| stores.string_value(h))
                    .unwrap_or_default()
            }
        })
    }

    /// Node-set view; a fragment converts to the singleton set of its root.
    pub fn to_node_set(&self) -> Result<NodeSequence, Error> {
        match self {
            Value::NodeSet(s) => Ok(s.clone_with_reset()),
            Value::Fragment(h) => Ok(NodeSequence::singleton(*h)),
            other => Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("cannot convert {} to a node-set", other.type_name()),
            )),
        }
    }

    pub fn is_node_set(&self) -> bool {
        matches!(self, Value::NodeSet(_) | Value::Fragment(_))
    }
}

/// XPath 1.0 number-to-string: `NaN`, `Infinity`, integers without a fraction,
/// never exponent notation.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        // f64's Display is shortest-round-trip and never uses an exponent
        format!("{n}")
    }
}

/// XPath 1.0 string-to-number: optional whitespace, optional `-`, digits with an
/// optional fraction. Anything else is NaN.
pub fn parse_number(s: &str) -> f64 {
    let t = s.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'));
    let body = t.strip_prefix('-').unwrap_or(t);
    let mut digits = 0usize;
    let mut dots = 0usize;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return f64::NAN,
        }
    }
    if digits == 0 || dots > 1 {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_format_like_xpath() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(1e21), "1000000000000000000000");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn numbers_parse_like_xpath() {
        assert_eq!(parse_number(" 12 "), 12.0);
        assert_eq!(parse_number("-.5"), -0.5);
        assert_eq!(parse_number("3."), 3.0);
        assert!(parse_number("1e3").is_nan());
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("inf").is_nan());
        assert!(parse_number("").is_nan());
    }
}

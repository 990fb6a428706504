//! Compiled expression tree. Nodes are immutable after compilation and shared
//! (`Arc`) between compiled paths, caches and variable thunks.
use core::fmt;
use std::sync::Arc;

use super::pattern::UnionPattern;
use crate::model::{NodeKind, QName};
use crate::parser::ast::{Axis, BinaryOp};
use crate::runtime::{Error, VarRef, XPathContext};
use crate::xdm::{ExpandedName, Value};

/// Caller-supplied expression node, evaluated like any built-in node.
pub trait ExtensionExpr: fmt::Debug + Send + Sync {
    fn execute(&self, ctx: &mut XPathContext) -> Result<Value, Error>;
}

/// Node test with prefixes already resolved to namespace URIs.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name {
        ns_uri: Option<String>,
        local: String,
    },
    NamespaceWildcard(String),
    Wildcard,
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

impl NodeTest {
    /// Kind a name test selects on `axis`.
    pub fn principal_kind(axis: Axis) -> NodeKind {
        match axis {
            Axis::Attribute => NodeKind::Attribute,
            Axis::Namespace => NodeKind::Namespace,
            _ => NodeKind::Element,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Last,
    Position,
    Count,
    LocalName,
    NamespaceUri,
    Name,
    String,
    Concat,
    StartsWith,
    Contains,
    StringLength,
    NormalizeSpace,
    Boolean,
    Not,
    True,
    False,
    Number,
    Sum,
    Floor,
    Ceiling,
    Round,
    Current,
    FunctionAvailable,
}

const FUNCTIONS: &[(&str, Function, usize, Option<usize>)] = &[
    ("last", Function::Last, 0, Some(0)),
    ("position", Function::Position, 0, Some(0)),
    ("count", Function::Count, 1, Some(1)),
    ("local-name", Function::LocalName, 0, Some(1)),
    ("namespace-uri", Function::NamespaceUri, 0, Some(1)),
    ("name", Function::Name, 0, Some(1)),
    ("string", Function::String, 0, Some(1)),
    ("concat", Function::Concat, 2, None),
    ("starts-with", Function::StartsWith, 2, Some(2)),
    ("contains", Function::Contains, 2, Some(2)),
    ("string-length", Function::StringLength, 0, Some(1)),
    ("normalize-space", Function::NormalizeSpace, 0, Some(1)),
    ("boolean", Function::Boolean, 1, Some(1)),
    ("not", Function::Not, 1, Some(1)),
    ("true", Function::True, 0, Some(0)),
    ("false", Function::False, 0, Some(0)),
    ("number", Function::Number, 0, Some(1)),
    ("sum", Function::Sum, 1, Some(1)),
    ("floor", Function::Floor, 1, Some(1)),
    ("ceiling", Function::Ceiling, 1, Some(1)),
    ("round", Function::Round, 1, Some(1)),
    ("current", Function::Current, 0, Some(0)),
    ("function-available", Function::FunctionAvailable, 1, Some(1)),
];

impl Function {
    pub fn lookup(name: &str) -> Option<Function> {
        FUNCTIONS
            .iter()
            .find(|(n, ..)| *n == name)
            .map(|(_, f, ..)| *f)
    }

    fn entry(self) -> &'static (&'static str, Function, usize, Option<usize>) {
        // every variant has a table row
        FUNCTIONS
            .iter()
            .find(|(_, f, ..)| *f == self)
            .unwrap_or(&FUNCTIONS[0])
    }

    pub fn name(self) -> &'static str {
        self.entry().0
    }

    /// Minimum and (if bounded) maximum argument count.
    pub fn arity(self) -> (usize, Option<usize>) {
        let (_, _, min, max) = *self.entry();
        (min, max)
    }

    pub fn accepts(self, args: usize) -> bool {
        let (min, max) = self.arity();
        args >= min && max.is_none_or(|m| args <= m)
    }
}

/// Node produced by a fragment constructor.
#[derive(Debug, Clone)]
pub enum FragmentNode {
    Element {
        name: QName,
        attributes: Vec<(QName, Expr)>,
        children: Vec<FragmentNode>,
    },
    Text(String),
    /// Text node holding the string value of the expression.
    ValueOf(Expr),
    Comment(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    String(String),
    Number(f64),
    Variable {
        var: VarRef,
        name: ExpandedName,
    },
    LocationPath(LocationPath),
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Union(Box<Expr>, Box<Expr>),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    /// Builds a result tree fragment from the listed top-level nodes.
    Construct(Vec<FragmentNode>),
    /// Match pattern; evaluates to the match score of the current node.
    Pattern(UnionPattern),
    Extension(Arc<dyn ExtensionExpr>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_table_covers_arity() {
        assert_eq!(Function::lookup("concat"), Some(Function::Concat));
        assert!(Function::Concat.accepts(5));
        assert!(!Function::Concat.accepts(1));
        assert!(Function::Name.accepts(0));
        assert!(!Function::Count.accepts(2));
        assert_eq!(Function::Round.name(), "round");
        assert!(Function::lookup("document").is_none());
    }
}

use core::fmt;
use std::sync::Arc;

use crate::consts::{DTM_ERR_NS, ERR_NS};
use crate::xdm::ExpandedName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    XPST0003, // syntax error / not a valid pattern
    XPST0008, // undeclared variable
    XPST0017, // unknown function or wrong arity
    XPST0081, // undeclared namespace prefix
    XPTY0004, // type error
    XPDY0002, // context node undefined
    FOER0000, // generic evaluation error
    DTMX0001, // variable read before binding
    DTMX0002, // circular variable reference
    DTMX0003, // mutation of a read-only node sequence
    DTMX0004, // random access on a non-caching node sequence
    DTMX0005, // cache mode toggled after iteration started
    DTMX0006, // recursion limit exceeded
    DTMX0007, // unsupported compile mode
    DTMX0008, // wrapped external failure
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::XPST0003 => "XPST0003",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPST0081 => "XPST0081",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::DTMX0001 => "DTMX0001",
            ErrorCode::DTMX0002 => "DTMX0002",
            ErrorCode::DTMX0003 => "DTMX0003",
            ErrorCode::DTMX0004 => "DTMX0004",
            ErrorCode::DTMX0005 => "DTMX0005",
            ErrorCode::DTMX0006 => "DTMX0006",
            ErrorCode::DTMX0007 => "DTMX0007",
            ErrorCode::DTMX0008 => "DTMX0008",
        }
    }

    /// Parse `err:CODE`, `dtm:CODE` or the bare code.
    pub fn from_code(s: &str) -> Option<Self> {
        let local = s
            .strip_prefix("err:")
            .or_else(|| s.strip_prefix("dtm:"))
            .unwrap_or(s);
        Some(match local {
            "XPST0003" => ErrorCode::XPST0003,
            "XPST0008" => ErrorCode::XPST0008,
            "XPST0017" => ErrorCode::XPST0017,
            "XPST0081" => ErrorCode::XPST0081,
            "XPTY0004" => ErrorCode::XPTY0004,
            "XPDY0002" => ErrorCode::XPDY0002,
            "FOER0000" => ErrorCode::FOER0000,
            "DTMX0001" => ErrorCode::DTMX0001,
            "DTMX0002" => ErrorCode::DTMX0002,
            "DTMX0003" => ErrorCode::DTMX0003,
            "DTMX0004" => ErrorCode::DTMX0004,
            "DTMX0005" => ErrorCode::DTMX0005,
            "DTMX0006" => ErrorCode::DTMX0006,
            "DTMX0007" => ErrorCode::DTMX0007,
            "DTMX0008" => ErrorCode::DTMX0008,
            _ => return None,
        })
    }

    fn is_engine_code(&self) -> bool {
        self.as_str().starts_with("DTMX")
    }

    /// QName of the code: W3C codes live in the xqt-errors namespace, engine
    /// codes in [`DTM_ERR_NS`].
    pub fn qname(&self) -> ExpandedName {
        let ns = if self.is_engine_code() { DTM_ERR_NS } else { ERR_NS };
        ExpandedName::new(Some(ns.to_string()), self.as_str())
    }

    /// Failures that abort the whole evaluation rather than one expression.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCode::DTMX0001 | ErrorCode::DTMX0002 | ErrorCode::DTMX0006 | ErrorCode::DTMX0008
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_engine_code() { "dtm" } else { "err" };
        write!(f, "{}:{}", prefix, self.as_str())
    }
}

/// Where an expression came from, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocator {
    pub system_id: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub expression: Option<String>,
}

impl SourceLocator {
    pub fn new(system_id: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            system_id: Some(system_id.into()),
            line: Some(line),
            column: Some(column),
            expression: None,
        }
    }

    pub fn with_expression(mut self, text: impl Into<String>) -> Self {
        self.expression = Some(text.into());
        self
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.system_id {
            write!(f, "{id}")?;
        }
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(col) = self.column {
                write!(f, ":{col}")?;
            }
        }
        if let Some(expr) = &self.expression {
            write!(f, " in '{expr}'")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub locator: Option<SourceLocator>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>, // optional chained cause
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            locator: None,
            source: None,
        }
    }

    /// Compose an error with a source cause.
    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Attach a locator unless one is already present; the innermost locator wins.
    pub fn with_locator(mut self, locator: &SourceLocator) -> Self {
        if self.locator.is_none() {
            self.locator = Some(locator.clone());
        }
        self
    }

    /// Wrap a failure raised by an external collaborator (tree store, extension).
    pub fn wrap(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        let message = err.to_string();
        Self::from_code(ErrorCode::DTMX0008, message).with_source(Some(
            Arc::new(err) as Arc<dyn std::error::Error + Send + Sync>
        ))
    }

    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }

    pub fn format_code(&self) -> String {
        self.code.to_string()
    }

    /// Strip wrapping layers: a wrapped error yields its innermost cause's message,
    /// falling back to `fallback` when no cause has a message.
    pub fn unwrapped_message(&self, fallback: &str) -> String {
        if self.code != ErrorCode::DTMX0008 {
            return self.message.clone();
        }
        let mut cause: Option<&(dyn std::error::Error + 'static)> = self
            .source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static));
        let mut message = None;
        while let Some(c) = cause {
            let m = c.to_string();
            if !m.is_empty() {
                message = Some(m);
            }
            cause = c.source();
        }
        message
            .or_else(|| (!self.message.is_empty()).then(|| self.message.clone()))
            .unwrap_or_else(|| fallback.to_string())
    }

    pub(crate) fn unbound_variable(what: impl fmt::Display) -> Self {
        Self::from_code(
            ErrorCode::DTMX0001,
            format!("variable accessed before binding: {what}"),
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())?;
        if let Some(loc) = &self.locator {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}

/// Receives diagnostics from compilation and evaluation.
///
/// Returning `Ok(())` suppresses the condition; returning `Err` escalates it
/// to the caller.
pub trait ErrorListener: Send + Sync {
    fn warning(&self, err: &Error) -> Result<(), Error> {
        tracing::warn!(code = %err.code, "{}", err.message);
        Ok(())
    }
    fn error(&self, err: Error) -> Result<(), Error>;
    fn fatal_error(&self, err: Error) -> Result<(), Error>;
}

/// Logs warnings and propagates errors and fatal errors unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorListener;

impl ErrorListener for DefaultErrorListener {
    fn error(&self, err: Error) -> Result<(), Error> {
        Err(err)
    }

    fn fatal_error(&self, err: Error) -> Result<(), Error> {
        Err(err)
    }
}

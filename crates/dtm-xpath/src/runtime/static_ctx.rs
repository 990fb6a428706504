use core::fmt;
use std::collections::HashMap;

use crate::xdm::ExpandedName;

/// Resolves namespace prefixes in scope for an expression.
pub trait PrefixResolver: Send + Sync + fmt::Debug {
    fn namespace_for_prefix(&self, prefix: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceBindings {
    pub by_prefix: HashMap<String, String>,
}

impl PrefixResolver for NamespaceBindings {
    fn namespace_for_prefix(&self, prefix: &str) -> Option<String> {
        self.by_prefix.get(prefix).cloned()
    }
}

/// Where a variable reference lives on the variable stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarRef {
    /// Slot relative to the current frame bottom.
    Local(usize),
    /// Absolute slot from the stack base.
    Global(usize),
}

#[derive(Debug, Clone)]
pub struct StaticContext {
    pub namespaces: NamespaceBindings,
    /// Global variables in slot order.
    pub globals: Vec<ExpandedName>,
    /// Local variables of the innermost frame in slot order.
    pub locals: Vec<ExpandedName>,
}

impl Default for StaticContext {
    fn default() -> Self {
        let mut ns = NamespaceBindings::default();
        // implicit xml binding, cannot be overridden
        ns.by_prefix
            .insert("xml".to_string(), crate::consts::XML_URI.to_string());
        Self {
            namespaces: ns,
            globals: Vec::new(),
            locals: Vec::new(),
        }
    }
}

impl StaticContext {
    /// Fix a variable name to its slot: the most recently declared local wins
    /// over earlier locals, locals win over globals.
    pub fn resolve_variable(&self, name: &ExpandedName) -> Option<VarRef> {
        if let Some(i) = self.locals.iter().rposition(|n| n == name) {
            return Some(VarRef::Local(i));
        }
        self.globals
            .iter()
            .position(|n| n == name)
            .map(VarRef::Global)
    }

    pub fn global_slot_count(&self) -> usize {
        self.globals.len()
    }

    pub fn local_slot_count(&self) -> usize {
        self.locals.len()
    }
}

impl PrefixResolver for StaticContext {
    fn namespace_for_prefix(&self, prefix: &str) -> Option<String> {
        self.namespaces.namespace_for_prefix(prefix)
    }
}

/// Builder for `StaticContext`.
///
/// The context is captured by a compiled path at compile time: prefixes and
/// variable names are resolved once and never looked up again.
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: StaticContext::default(),
        }
    }

    /// Register a namespace prefix → URI mapping. Attempts to override the reserved `xml`
    /// prefix are ignored.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" {
            return self;
        }
        self.ctx.namespaces.by_prefix.insert(p, uri.into());
        self
    }

    /// Declare the next global slot.
    pub fn with_global_variable(mut self, name: ExpandedName) -> Self {
        self.ctx.globals.push(name);
        self
    }

    /// Declare the next local slot of the frame the expression will run in.
    pub fn with_local_variable(mut self, name: ExpandedName) -> Self {
        self.ctx.locals.push(name);
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

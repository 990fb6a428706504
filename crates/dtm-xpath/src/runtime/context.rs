//! The evaluation context: tree stores, variable stack, RTF pool and the state
//! stacks threaded through a (possibly recursive) evaluation.
//!
//! Every stack starts with one sentinel entry; popping at the sentinel is
//! logged and ignored. The engine only touches the stacks through the scope
//! guards returned by the `*_scope` methods, which pop on drop and therefore on
//! every exit path.
use core::fmt;
use core::ops::{Deref, DerefMut};
use std::sync::Arc;

use smallvec::{SmallVec, smallvec};

use super::rtf::RtfPool;
use super::static_ctx::{PrefixResolver, VarRef};
use super::variables::{Thunk, VarSlot, VariableStack};
use super::{DefaultErrorListener, Error, ErrorCode, ErrorListener};
use crate::model::{DocumentOrder, NodeHandle, StoreId, TreeStoreManager};
use crate::xdm::{NodeSequence, Value};

pub const DEFAULT_RECURSION_LIMIT: usize = 4096;
pub const DEFAULT_VARIABLE_SLOTS: usize = 256;
pub const DEFAULT_LINK_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct ContextConfig {
    /// Maximum depth of the current-node stack and of linked frames.
    pub recursion_limit: usize,
    pub initial_variable_slots: usize,
    pub initial_link_capacity: usize,
    /// Slots reserved for globals below the first frame.
    pub global_slots: usize,
    pub listener: Arc<dyn ErrorListener>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            initial_variable_slots: DEFAULT_VARIABLE_SLOTS,
            initial_link_capacity: DEFAULT_LINK_CAPACITY,
            global_slots: 0,
            listener: Arc::new(DefaultErrorListener),
        }
    }
}

impl fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConfig")
            .field("recursion_limit", &self.recursion_limit)
            .field("initial_variable_slots", &self.initial_variable_slots)
            .field("initial_link_capacity", &self.initial_link_capacity)
            .field("global_slots", &self.global_slots)
            .finish_non_exhaustive()
    }
}

/// Depth of every state stack, for checking push/pop symmetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackDepths {
    pub current_nodes: usize,
    pub expression_nodes: usize,
    pub namespace_contexts: usize,
    pub sub_context_lists: usize,
    pub context_node_lists: usize,
    pub predicate_positions: usize,
    pub predicate_roots: usize,
    pub iterator_roots: usize,
    pub rtf_contexts: usize,
    pub variable_links: usize,
    pub frame_top: usize,
}

macro_rules! guarded_pop {
    ($stack:expr, $what:literal) => {
        if $stack.len() > 1 {
            $stack.pop()
        } else {
            tracing::warn!(stack = $what, "pop at sentinel floor ignored");
            None
        }
    };
}

pub struct XPathContext {
    stores: TreeStoreManager,
    vars: VariableStack,
    rtf: RtfPool,
    current_nodes: SmallVec<[NodeHandle; 16]>,
    expression_nodes: SmallVec<[NodeHandle; 16]>,
    namespace_contexts: SmallVec<[Option<Arc<dyn PrefixResolver>>; 8]>,
    sub_context_lists: Vec<Option<NodeSequence>>,
    context_node_lists: Vec<Option<NodeSequence>>,
    predicate_pos: SmallVec<[usize; 8]>,
    predicate_roots: SmallVec<[NodeHandle; 8]>,
    iterator_roots: SmallVec<[NodeHandle; 8]>,
    /// Non-zero while a global variable is being forced.
    global_forcing: usize,
    config: ContextConfig,
}

impl Default for XPathContext {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl fmt::Debug for XPathContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPathContext")
            .field("depths", &self.stack_depths())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl XPathContext {
    pub fn new(config: ContextConfig) -> Self {
        Self::with_stores(config, TreeStoreManager::new())
    }

    pub fn with_stores(config: ContextConfig, stores: TreeStoreManager) -> Self {
        let mut vars = VariableStack::new(
            config.initial_variable_slots,
            config.initial_link_capacity,
            config.recursion_limit,
        );
        vars.reserve_globals(config.global_slots);
        Self {
            stores,
            vars,
            rtf: RtfPool::new(),
            current_nodes: smallvec![NodeHandle::NULL],
            expression_nodes: smallvec![NodeHandle::NULL],
            namespace_contexts: smallvec![None],
            sub_context_lists: vec![None],
            context_node_lists: vec![None],
            predicate_pos: smallvec![0],
            predicate_roots: smallvec![NodeHandle::NULL],
            iterator_roots: smallvec![NodeHandle::NULL],
            global_forcing: 0,
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn stores(&self) -> &TreeStoreManager {
        &self.stores
    }

    pub fn stores_mut(&mut self) -> &mut TreeStoreManager {
        &mut self.stores
    }

    pub fn vars(&self) -> &VariableStack {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableStack {
        &mut self.vars
    }

    pub fn error_listener(&self) -> Arc<dyn ErrorListener> {
        self.config.listener.clone()
    }

    pub fn set_error_listener(&mut self, listener: Arc<dyn ErrorListener>) {
        self.config.listener = listener;
    }

    /// Release every store the context allocated and put each stack back to
    /// its sentinel. Caller-registered stores stay registered.
    pub fn reset(&mut self) {
        self.rtf.release_all(&mut self.stores);
        self.vars.reset();
        self.current_nodes.truncate(1);
        self.expression_nodes.truncate(1);
        self.namespace_contexts.truncate(1);
        self.namespace_contexts[0] = None;
        self.sub_context_lists.truncate(1);
        self.context_node_lists.truncate(1);
        self.predicate_pos.truncate(1);
        self.predicate_roots.truncate(1);
        self.iterator_roots.truncate(1);
        self.global_forcing = 0;
        tracing::debug!("evaluation context reset");
    }

    pub fn stack_depths(&self) -> StackDepths {
        StackDepths {
            current_nodes: self.current_nodes.len(),
            expression_nodes: self.expression_nodes.len(),
            namespace_contexts: self.namespace_contexts.len(),
            sub_context_lists: self.sub_context_lists.len(),
            context_node_lists: self.context_node_lists.len(),
            predicate_positions: self.predicate_pos.len(),
            predicate_roots: self.predicate_roots.len(),
            iterator_roots: self.iterator_roots.len(),
            rtf_contexts: self.rtf.depth(),
            variable_links: self.vars.link_depth(),
            frame_top: self.vars.frame_top(),
        }
    }

    // ===== current node / expression node =====

    fn check_depth(&self) -> Result<(), Error> {
        if self.current_nodes.len() >= self.config.recursion_limit {
            return Err(Error::from_code(
                ErrorCode::DTMX0006,
                format!("recursion limit of {} exceeded", self.config.recursion_limit),
            ));
        }
        Ok(())
    }

    pub fn current_node(&self) -> NodeHandle {
        self.current_nodes.last().copied().unwrap_or(NodeHandle::NULL)
    }

    pub fn current_expression_node(&self) -> NodeHandle {
        self.expression_nodes
            .last()
            .copied()
            .unwrap_or(NodeHandle::NULL)
    }

    pub fn push_current_node(&mut self, node: NodeHandle) -> Result<(), Error> {
        self.check_depth()?;
        self.current_nodes.push(node);
        Ok(())
    }

    pub fn pop_current_node(&mut self) {
        guarded_pop!(self.current_nodes, "current node");
    }

    pub fn push_current_expression_node(&mut self, node: NodeHandle) {
        self.expression_nodes.push(node);
    }

    pub fn pop_current_expression_node(&mut self) {
        guarded_pop!(self.expression_nodes, "expression node");
    }

    pub fn push_current_node_and_expression(
        &mut self,
        cn: NodeHandle,
        en: NodeHandle,
    ) -> Result<(), Error> {
        self.check_depth()?;
        self.current_nodes.push(cn);
        self.expression_nodes.push(en);
        Ok(())
    }

    pub fn pop_current_node_and_expression(&mut self) {
        guarded_pop!(self.current_nodes, "current node");
        guarded_pop!(self.expression_nodes, "expression node");
    }

    /// Like [`push_current_node_and_expression`](Self::push_current_node_and_expression)
    /// plus a namespace context for the sub-expression.
    pub fn push_expression_state(
        &mut self,
        cn: NodeHandle,
        en: NodeHandle,
        resolver: Option<Arc<dyn PrefixResolver>>,
    ) -> Result<(), Error> {
        self.push_current_node_and_expression(cn, en)?;
        self.namespace_contexts.push(resolver);
        Ok(())
    }

    pub fn pop_expression_state(&mut self) {
        self.pop_current_node_and_expression();
        guarded_pop!(self.namespace_contexts, "namespace context");
    }

    // ===== namespace contexts =====

    pub fn push_namespace_context(&mut self, resolver: Arc<dyn PrefixResolver>) {
        self.namespace_contexts.push(Some(resolver));
    }

    /// Reserve a slot to be filled later with [`set_namespace_context`](Self::set_namespace_context).
    pub fn push_namespace_context_null(&mut self) {
        self.namespace_contexts.push(None);
    }

    /// Replace the top slot in place.
    pub fn set_namespace_context(&mut self, resolver: Arc<dyn PrefixResolver>) {
        if let Some(top) = self.namespace_contexts.last_mut() {
            *top = Some(resolver);
        }
    }

    pub fn pop_namespace_context(&mut self) {
        guarded_pop!(self.namespace_contexts, "namespace context");
    }

    pub fn get_namespace_context(&self) -> Option<Arc<dyn PrefixResolver>> {
        self.namespace_contexts.last().cloned().flatten()
    }

    /// Resolve through the innermost non-empty namespace context.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<String> {
        self.namespace_contexts
            .iter()
            .rev()
            .find_map(Option::as_ref)
            .and_then(|r| r.namespace_for_prefix(prefix))
    }

    // ===== node lists =====

    pub fn push_sub_context_list(&mut self, list: NodeSequence) {
        self.sub_context_lists.push(Some(list));
    }

    pub fn pop_sub_context_list(&mut self) {
        guarded_pop!(self.sub_context_lists, "sub-context list");
    }

    pub fn get_sub_context_list(&self) -> Option<&NodeSequence> {
        self.sub_context_lists.last().and_then(Option::as_ref)
    }

    pub fn get_sub_context_list_mut(&mut self) -> Option<&mut NodeSequence> {
        self.sub_context_lists.last_mut().and_then(Option::as_mut)
    }

    /// Push the list a caller is iterating (`None` hides any outer list).
    pub fn push_context_node_list(&mut self, list: Option<NodeSequence>) {
        self.context_node_lists.push(list);
    }

    pub fn pop_context_node_list(&mut self) {
        guarded_pop!(self.context_node_lists, "context node list");
    }

    pub fn get_context_node_list(&self) -> Option<&NodeSequence> {
        self.context_node_lists.last().and_then(Option::as_ref)
    }

    pub fn get_context_node_list_mut(&mut self) -> Option<&mut NodeSequence> {
        self.context_node_lists.last_mut().and_then(Option::as_mut)
    }

    // ===== predicate / iterator state =====

    pub fn push_predicate_root(&mut self, node: NodeHandle) {
        self.predicate_roots.push(node);
    }

    pub fn pop_predicate_root(&mut self) {
        guarded_pop!(self.predicate_roots, "predicate root");
    }

    pub fn get_predicate_root(&self) -> NodeHandle {
        self.predicate_roots
            .last()
            .copied()
            .unwrap_or(NodeHandle::NULL)
    }

    pub fn push_iterator_root(&mut self, node: NodeHandle) {
        self.iterator_roots.push(node);
    }

    pub fn pop_iterator_root(&mut self) {
        guarded_pop!(self.iterator_roots, "iterator root");
    }

    pub fn get_iterator_root(&self) -> NodeHandle {
        self.iterator_roots
            .last()
            .copied()
            .unwrap_or(NodeHandle::NULL)
    }

    /// 1-based position of the node under a predicate test; 0 outside predicates.
    pub fn push_predicate_pos(&mut self, pos: usize) {
        self.predicate_pos.push(pos);
    }

    pub fn pop_predicate_pos(&mut self) {
        guarded_pop!(self.predicate_pos, "predicate position");
    }

    pub fn get_predicate_pos(&self) -> usize {
        self.predicate_pos.last().copied().unwrap_or(0)
    }

    /// `position()`: the predicate position when testing a predicate,
    /// otherwise the cursor of the context node list, otherwise 1.
    pub fn context_position(&self) -> usize {
        let p = self.get_predicate_pos();
        if p > 0 {
            return p;
        }
        self.get_context_node_list()
            .map_or(1, |l| l.current_pos().max(1))
    }

    /// `last()`: length of the list `context_position` refers to.
    pub fn context_size(&mut self) -> Result<usize, Error> {
        if self.get_predicate_pos() > 0
            && let Some(list) = self.get_sub_context_list_mut()
        {
            return list.get_length();
        }
        match self.get_context_node_list_mut() {
            Some(list) => list.get_length(),
            None => Ok(1),
        }
    }

    // ===== result tree fragments =====

    pub fn get_rtf_dtm(&mut self) -> StoreId {
        self.rtf.get_rtf_dtm(&mut self.stores)
    }

    pub fn get_global_rtf_dtm(&mut self) -> StoreId {
        self.rtf.get_global_rtf_dtm(&mut self.stores)
    }

    pub fn push_rtf_context(&mut self) {
        self.rtf.push_context(&mut self.stores);
    }

    pub fn pop_rtf_context(&mut self) {
        self.rtf.pop_context(&mut self.stores);
    }

    pub fn rtf_pool(&self) -> &RtfPool {
        &self.rtf
    }

    /// Store the next fragment should be built in: global while forcing a
    /// global variable, pooled otherwise.
    pub(crate) fn fragment_target(&mut self) -> StoreId {
        if self.global_forcing > 0 {
            self.get_global_rtf_dtm()
        } else {
            self.get_rtf_dtm()
        }
    }

    // ===== variables =====

    /// Read slot `index` of the current frame, forcing a thunk if needed.
    /// Without `destructive_ok` a node-set is handed out with a fresh cursor.
    pub fn get_local_variable(&mut self, index: usize, destructive_ok: bool) -> Result<Value, Error> {
        let abs = self.vars.stack_frame() + index;
        self.read_slot(abs, destructive_ok, || format!("local slot {index}"))
    }

    pub fn get_global_variable(&mut self, index: usize, destructive_ok: bool) -> Result<Value, Error> {
        self.read_slot(index, destructive_ok, || format!("global slot {index}"))
    }

    pub(crate) fn get_variable(&mut self, var: VarRef, name: &dyn fmt::Display) -> Result<Value, Error> {
        let abs = match var {
            VarRef::Local(i) => self.vars.stack_frame() + i,
            VarRef::Global(i) => i,
        };
        self.read_slot(abs, false, || format!("${name}"))
    }

    fn read_slot(
        &mut self,
        abs: usize,
        destructive_ok: bool,
        describe: impl Fn() -> String,
    ) -> Result<Value, Error> {
        let thunk = match self.vars.slot(abs) {
            None | Some(VarSlot::Unset) => return Err(Error::unbound_variable(describe())),
            Some(VarSlot::Forcing) => {
                return Err(Error::from_code(
                    ErrorCode::DTMX0002,
                    format!("circular reference to {}", describe()),
                ));
            }
            Some(VarSlot::Value(v)) => {
                return Ok(if destructive_ok { v.clone() } else { v.fresh() });
            }
            Some(VarSlot::Thunk(t)) => t.clone(),
        };
        self.vars.replace(abs, VarSlot::Forcing);
        match self.force(&thunk) {
            Ok(v) => {
                let out = if destructive_ok { v.clone() } else { v.fresh() };
                self.vars.replace(abs, VarSlot::Value(v));
                Ok(out)
            }
            Err(e) => {
                self.vars.replace(abs, VarSlot::Thunk(thunk));
                Err(e)
            }
        }
    }

    fn force(&mut self, thunk: &Thunk) -> Result<Value, Error> {
        let mut frame = self.stack_frame_scope(thunk.frame);
        let mut node = frame.node_scope(thunk.context_node)?;
        let mut pos = node.position_scope(0);
        let mut list = pos.context_list_scope(None);
        if thunk.is_global {
            let mut global = list.global_fragment_scope();
            thunk.expr.execute(&mut global)
        } else {
            thunk.expr.execute(&mut list)
        }
    }

    // ===== scopes =====

    fn scope(&mut self, restore: Restore) -> ContextScope<'_> {
        ContextScope { ctx: self, restore }
    }

    /// Current node and expression node both set to `node`.
    pub fn node_scope(&mut self, node: NodeHandle) -> Result<ContextScope<'_>, Error> {
        self.push_current_node_and_expression(node, node)?;
        Ok(self.scope(Restore::NodeAndExpression))
    }

    /// Current node only; `current()` keeps referring to the outer node.
    pub fn current_node_scope(&mut self, node: NodeHandle) -> Result<ContextScope<'_>, Error> {
        self.push_current_node(node)?;
        Ok(self.scope(Restore::CurrentNode))
    }

    pub fn expression_scope(
        &mut self,
        cn: NodeHandle,
        en: NodeHandle,
        resolver: Option<Arc<dyn PrefixResolver>>,
    ) -> Result<ContextScope<'_>, Error> {
        self.push_expression_state(cn, en, resolver)?;
        Ok(self.scope(Restore::ExpressionState))
    }

    /// Predicate root plus the candidate list position/last refer to.
    pub fn predicate_scope(&mut self, root: NodeHandle, candidates: NodeSequence) -> ContextScope<'_> {
        self.push_predicate_root(root);
        self.push_sub_context_list(candidates);
        self.scope(Restore::Predicate)
    }

    pub fn position_scope(&mut self, pos: usize) -> ContextScope<'_> {
        self.push_predicate_pos(pos);
        self.scope(Restore::PredicatePos)
    }

    pub fn iterator_root_scope(&mut self, root: NodeHandle) -> ContextScope<'_> {
        self.push_iterator_root(root);
        self.scope(Restore::IteratorRoot)
    }

    pub fn context_list_scope(&mut self, list: Option<NodeSequence>) -> ContextScope<'_> {
        self.push_context_node_list(list);
        self.scope(Restore::ContextNodeList)
    }

    /// Fragments built inside are discarded when the scope ends.
    pub fn rtf_scope(&mut self) -> ContextScope<'_> {
        self.push_rtf_context();
        self.scope(Restore::Rtf)
    }

    /// Link a frame of `size` slots, unlinked when the scope ends.
    pub fn frame_scope(&mut self, size: usize) -> Result<ContextScope<'_>, Error> {
        self.vars.link(size)?;
        Ok(self.scope(Restore::Frame))
    }

    /// Run with `frame` as the current frame bottom without linking.
    pub fn stack_frame_scope(&mut self, frame: usize) -> ContextScope<'_> {
        let saved = self.vars.stack_frame();
        self.vars.set_stack_frame(frame);
        self.scope(Restore::StackFrame(saved))
    }

    fn global_fragment_scope(&mut self) -> ContextScope<'_> {
        self.global_forcing += 1;
        self.scope(Restore::GlobalFragments)
    }
}

impl DocumentOrder for XPathContext {
    fn is_node_after(&self, a: NodeHandle, b: NodeHandle) -> bool {
        self.stores.is_node_after(a, b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restore {
    CurrentNode,
    NodeAndExpression,
    ExpressionState,
    Predicate,
    PredicatePos,
    IteratorRoot,
    ContextNodeList,
    Rtf,
    Frame,
    StackFrame(usize),
    GlobalFragments,
}

/// Guard that undoes one push when dropped. Dereferences to the context so
/// scopes nest: `ctx.node_scope(n)?.position_scope(1)`.
pub struct ContextScope<'a> {
    ctx: &'a mut XPathContext,
    restore: Restore,
}

impl Deref for ContextScope<'_> {
    type Target = XPathContext;

    fn deref(&self) -> &XPathContext {
        self.ctx
    }
}

impl DerefMut for ContextScope<'_> {
    fn deref_mut(&mut self) -> &mut XPathContext {
        self.ctx
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        let ctx = &mut *self.ctx;
        match self.restore {
            Restore::CurrentNode => ctx.pop_current_node(),
            Restore::NodeAndExpression => ctx.pop_current_node_and_expression(),
            Restore::ExpressionState => ctx.pop_expression_state(),
            Restore::Predicate => {
                ctx.pop_sub_context_list();
                ctx.pop_predicate_root();
            }
            Restore::PredicatePos => ctx.pop_predicate_pos(),
            Restore::IteratorRoot => ctx.pop_iterator_root(),
            Restore::ContextNodeList => ctx.pop_context_node_list(),
            Restore::Rtf => ctx.pop_rtf_context(),
            Restore::Frame => ctx.vars.unlink(),
            Restore::StackFrame(saved) => ctx.vars.set_stack_frame(saved),
            Restore::GlobalFragments => ctx.global_forcing = ctx.global_forcing.saturating_sub(1),
        }
    }
}

/// Builder for [`XPathContext`], mirroring `StaticContextBuilder`.
pub struct XPathContextBuilder {
    config: ContextConfig,
    stores: TreeStoreManager,
}

impl Default for XPathContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl XPathContextBuilder {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
            stores: TreeStoreManager::new(),
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.config.recursion_limit = limit;
        self
    }

    pub fn with_variable_slots(mut self, slots: usize) -> Self {
        self.config.initial_variable_slots = slots;
        self
    }

    pub fn with_link_capacity(mut self, links: usize) -> Self {
        self.config.initial_link_capacity = links;
        self
    }

    pub fn with_global_slots(mut self, count: usize) -> Self {
        self.config.global_slots = count;
        self
    }

    pub fn with_error_listener(mut self, listener: Arc<dyn ErrorListener>) -> Self {
        self.config.listener = listener;
        self
    }

    pub fn with_stores(mut self, stores: TreeStoreManager) -> Self {
        self.stores = stores;
        self
    }

    pub fn build(self) -> XPathContext {
        XPathContext::with_stores(self.config, self.stores)
    }
}

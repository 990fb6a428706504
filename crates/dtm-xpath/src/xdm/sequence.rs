//! Node sequences: a growable array of handles with a cursor on top.
//!
//! One concrete type serves array, cursor and document-order-set use. Two flags
//! govern it: `mutable` (inserts/removals allowed) and `cache_nodes` (nodes are
//! retained so random access and backward iteration work). A sequence may also
//! be backed by a lazy [`NodeCursor`]; such sequences are read-only and pull
//! nodes on demand.
use core::fmt;
use std::sync::Arc;

use crate::model::{DocumentOrder, NodeHandle};
use crate::runtime::{Error, ErrorCode};

/// Forward-only source of node handles that can be duplicated.
pub trait NodeCursor: Send + Sync {
    fn next_node(&mut self) -> Option<NodeHandle>;
    fn boxed_clone(&self) -> Box<dyn NodeCursor>;
}

impl<I> NodeCursor for I
where
    I: Iterator<Item = NodeHandle> + Clone + Send + Sync + 'static,
{
    fn next_node(&mut self) -> Option<NodeHandle> {
        self.next()
    }

    fn boxed_clone(&self) -> Box<dyn NodeCursor> {
        Box::new(self.clone())
    }
}

struct LazySource {
    /// Untouched copy used to restart a non-caching sequence.
    origin: Box<dyn NodeCursor>,
    active: Box<dyn NodeCursor>,
    exhausted: bool,
}

impl Clone for LazySource {
    fn clone(&self) -> Self {
        Self {
            origin: self.origin.boxed_clone(),
            active: self.active.boxed_clone(),
            exhausted: self.exhausted,
        }
    }
}

#[derive(Clone)]
pub struct NodeSequence {
    nodes: Arc<Vec<NodeHandle>>,
    next: usize,
    mutable: bool,
    cache_nodes: bool,
    source: Option<LazySource>,
}

impl Default for NodeSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSequence")
            .field("nodes", &self.nodes)
            .field("next", &self.next)
            .field("mutable", &self.mutable)
            .field("cache_nodes", &self.cache_nodes)
            .field("lazy", &self.source.is_some())
            .finish()
    }
}

impl PartialEq for NodeSequence {
    /// Compares materialized content only.
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

fn read_only() -> Error {
    Error::from_code(ErrorCode::DTMX0003, "node sequence is not mutable")
}

fn not_caching(op: &str) -> Error {
    Error::from_code(
        ErrorCode::DTMX0004,
        format!("{op} requires a node sequence that caches its nodes"),
    )
}

impl NodeSequence {
    /// Empty, mutable, caching sequence.
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(Vec::new()),
            next: 0,
            mutable: true,
            cache_nodes: true,
            source: None,
        }
    }

    pub fn singleton(node: NodeHandle) -> Self {
        Self::from_vec(vec![node])
    }

    /// Mutable sequence over `nodes`, kept in the given order.
    pub fn from_vec(nodes: Vec<NodeHandle>) -> Self {
        Self {
            nodes: Arc::new(nodes),
            ..Self::new()
        }
    }

    /// Eagerly copy every node an iterator yields.
    pub fn from_nodes<I: IntoIterator<Item = NodeHandle>>(nodes: I) -> Self {
        Self::from_vec(nodes.into_iter().collect())
    }

    /// Mutable copy of another sequence's materialized nodes.
    pub fn copy_of(other: &NodeSequence) -> Self {
        Self::from_vec(other.nodes.as_ref().clone())
    }

    /// Read-only sequence that pulls from `cursor` on demand.
    pub fn lazy(cursor: impl NodeCursor + 'static) -> Self {
        let active: Box<dyn NodeCursor> = Box::new(cursor);
        Self {
            nodes: Arc::new(Vec::new()),
            next: 0,
            mutable: false,
            cache_nodes: true,
            source: Some(LazySource {
                origin: active.boxed_clone(),
                active,
                exhausted: false,
            }),
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Make the sequence read-only; there is no way back.
    pub fn freeze(&mut self) {
        self.mutable = false;
    }

    pub fn should_cache_nodes(&self) -> bool {
        self.cache_nodes
    }

    /// True until the first node has been consumed.
    pub fn is_fresh(&self) -> bool {
        self.next == 0
    }

    /// Legal only while the sequence is fresh.
    pub fn set_should_cache_nodes(&mut self, cache: bool) -> Result<(), Error> {
        if !self.is_fresh() {
            return Err(Error::from_code(
                ErrorCode::DTMX0005,
                "cannot change node caching after iteration has started",
            ));
        }
        self.cache_nodes = cache;
        Ok(())
    }

    // ===== cursor =====

    fn pull(&mut self) -> Option<NodeHandle> {
        let src = self.source.as_mut()?;
        if src.exhausted {
            return None;
        }
        let n = src.active.next_node();
        if n.is_none() {
            src.exhausted = true;
        }
        n
    }

    /// Pull from the lazy source until at least `count` nodes are cached.
    fn fill_to(&mut self, count: Option<usize>) {
        while count.is_none_or(|c| self.nodes.len() < c) {
            match self.pull() {
                Some(n) => Arc::make_mut(&mut self.nodes).push(n),
                None => break,
            }
        }
    }

    pub fn next_node(&mut self) -> Option<NodeHandle> {
        if let Some(n) = self.nodes.get(self.next).copied() {
            self.next += 1;
            return Some(n);
        }
        let n = self.pull()?;
        if self.cache_nodes {
            Arc::make_mut(&mut self.nodes).push(n);
        }
        self.next += 1;
        Some(n)
    }

    /// Step back and return the node the last `next_node` call returned.
    pub fn previous_node(&mut self) -> Result<Option<NodeHandle>, Error> {
        if !self.cache_nodes {
            return Err(not_caching("previous_node"));
        }
        if self.next == 0 {
            return Ok(None);
        }
        self.next -= 1;
        Ok(self.nodes.get(self.next).copied())
    }

    /// Move the cursor to `index`, or past the last node for `None`.
    /// `None` materializes the whole lazy source.
    pub fn run_to(&mut self, index: Option<usize>) -> Result<(), Error> {
        if !self.cache_nodes {
            return Err(not_caching("run_to"));
        }
        self.fill_to(index);
        self.next = index.map_or(self.nodes.len(), |i| i.min(self.nodes.len()));
        Ok(())
    }

    /// Number of nodes consumed so far.
    pub fn current_pos(&self) -> usize {
        self.next
    }

    pub fn set_current_pos(&mut self, pos: usize) -> Result<(), Error> {
        if !self.cache_nodes {
            return Err(not_caching("set_current_pos"));
        }
        self.fill_to(Some(pos));
        self.next = pos.min(self.nodes.len());
        Ok(())
    }

    /// Rewind the cursor. A non-caching lazy sequence restarts its source and
    /// drops any prefix cached before caching was turned off.
    pub fn reset(&mut self) {
        self.next = 0;
        if !self.cache_nodes
            && let Some(src) = self.source.as_mut()
        {
            src.active = src.origin.boxed_clone();
            src.exhausted = false;
            self.nodes = Arc::new(Vec::new());
        }
    }

    /// Copy with the cursor rewound; storage stays shared until written.
    pub fn clone_with_reset(&self) -> Self {
        let mut c = self.clone();
        c.reset();
        c
    }

    // ===== random access =====

    /// Node at `index`; the cursor does not move.
    pub fn item(&mut self, index: usize) -> Result<Option<NodeHandle>, Error> {
        if !self.cache_nodes {
            return Err(not_caching("item"));
        }
        self.fill_to(Some(index + 1));
        Ok(self.nodes.get(index).copied())
    }

    /// Total length. Materializes the whole lazy source, which may be expensive.
    pub fn get_length(&mut self) -> Result<usize, Error> {
        if !self.cache_nodes {
            return Err(not_caching("get_length"));
        }
        self.fill_to(None);
        Ok(self.nodes.len())
    }

    /// Nodes materialized so far.
    pub fn as_slice(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// All nodes, materializing the lazy source.
    pub fn to_vec(&mut self) -> Result<Vec<NodeHandle>, Error> {
        self.get_length()?;
        Ok(self.nodes.as_ref().clone())
    }

    /// Every node, walked on a rewound copy. Works whether or not the
    /// sequence caches; `self` is left untouched.
    pub fn collect_nodes(&self) -> Vec<NodeHandle> {
        self.clone().into_iter().collect()
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains(&node)
    }

    // ===== mutation =====

    fn storage_mut(&mut self) -> Result<&mut Vec<NodeHandle>, Error> {
        if !self.mutable {
            return Err(read_only());
        }
        Ok(Arc::make_mut(&mut self.nodes))
    }

    /// Append with no ordering or uniqueness check.
    pub fn add_node(&mut self, node: NodeHandle) -> Result<(), Error> {
        self.storage_mut()?.push(node);
        Ok(())
    }

    pub fn add_nodes<I: IntoIterator<Item = NodeHandle>>(&mut self, nodes: I) -> Result<(), Error> {
        self.storage_mut()?.extend(nodes);
        Ok(())
    }

    pub fn insert_node(&mut self, node: NodeHandle, pos: usize) -> Result<(), Error> {
        let v = self.storage_mut()?;
        let pos = pos.min(v.len());
        v.insert(pos, node);
        Ok(())
    }

    /// Remove the first occurrence of `node`; returns whether one was found.
    pub fn remove_node(&mut self, node: NodeHandle) -> Result<bool, Error> {
        let v = self.storage_mut()?;
        match v.iter().position(|n| *n == node) {
            Some(i) => {
                v.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Insert keeping document order, scanning back from the tail. Returns the
    /// insert index, or `None` when `node` is already present.
    pub fn insert_in_document_order(
        &mut self,
        node: NodeHandle,
        order: &impl DocumentOrder,
    ) -> Result<Option<usize>, Error> {
        let v = self.storage_mut()?;
        let mut i = v.len();
        while i > 0 {
            let child = v[i - 1];
            if child == node {
                return Ok(None);
            }
            if order.is_node_after(node, child) {
                break;
            }
            i -= 1;
        }
        v.insert(i, node);
        Ok(Some(i))
    }

    /// Append unless already present; order is not enforced.
    pub fn append_unique(&mut self, node: NodeHandle) -> Result<Option<usize>, Error> {
        let v = self.storage_mut()?;
        if v.contains(&node) {
            return Ok(None);
        }
        v.push(node);
        Ok(Some(v.len() - 1))
    }
}

impl IntoIterator for NodeSequence {
    type Item = NodeHandle;
    type IntoIter = NodeSequenceIter;

    fn into_iter(self) -> Self::IntoIter {
        NodeSequenceIter(self.clone_with_reset())
    }
}

pub struct NodeSequenceIter(NodeSequence);

impl Iterator for NodeSequenceIter {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        self.0.next_node()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeId, StoreId};

    struct ById;
    impl DocumentOrder for ById {
        fn is_node_after(&self, a: NodeHandle, b: NodeHandle) -> bool {
            a > b
        }
    }

    fn h(n: u32) -> NodeHandle {
        NodeHandle::new(StoreId(0), NodeId(n))
    }

    #[test]
    fn document_order_insert_suppresses_duplicates() {
        let (a, b, c) = (h(1), h(2), h(3));
        let mut s = NodeSequence::new();
        assert_eq!(s.insert_in_document_order(c, &ById).unwrap(), Some(0));
        assert_eq!(s.insert_in_document_order(a, &ById).unwrap(), Some(0));
        assert_eq!(s.insert_in_document_order(b, &ById).unwrap(), Some(1));
        assert_eq!(s.insert_in_document_order(a, &ById).unwrap(), None);
        assert_eq!(s.as_slice(), &[a, b, c]);
    }

    #[test]
    fn append_unique_keeps_caller_order() {
        let mut s = NodeSequence::new();
        s.append_unique(h(3)).unwrap();
        s.append_unique(h(1)).unwrap();
        assert_eq!(s.append_unique(h(3)).unwrap(), None);
        assert_eq!(s.as_slice(), &[h(3), h(1)]);
    }

    #[test]
    fn cache_toggle_requires_fresh() {
        let mut s = NodeSequence::from_vec(vec![h(1), h(2)]);
        assert!(s.set_should_cache_nodes(false).is_ok());
        assert!(s.set_should_cache_nodes(true).is_ok());
        s.next_node();
        let err = s.set_should_cache_nodes(true).unwrap_err();
        assert_eq!(err.code, ErrorCode::DTMX0005);
    }

    #[test]
    fn non_caching_rejects_random_access() {
        let mut s = NodeSequence::lazy(vec![h(1), h(2)].into_iter());
        s.set_should_cache_nodes(false).unwrap();
        assert_eq!(s.next_node(), Some(h(1)));
        assert_eq!(s.previous_node().unwrap_err().code, ErrorCode::DTMX0004);
        assert_eq!(s.item(0).unwrap_err().code, ErrorCode::DTMX0004);
        assert_eq!(s.run_to(None).unwrap_err().code, ErrorCode::DTMX0004);
        s.reset();
        assert_eq!(s.next_node(), Some(h(1)));
    }

    #[test]
    fn restart_after_disabling_cache_does_not_repeat_the_prefix() {
        let mut s = NodeSequence::lazy((1..=3).map(h));
        assert_eq!(s.item(0).unwrap(), Some(h(1)));
        s.set_should_cache_nodes(false).unwrap();
        let first: Vec<_> = core::iter::from_fn(|| s.next_node()).collect();
        assert_eq!(first, [h(1), h(2), h(3)]);
        s.reset();
        let second: Vec<_> = core::iter::from_fn(|| s.next_node()).collect();
        assert_eq!(second, [h(1), h(2), h(3)]);
    }

    #[test]
    fn collect_nodes_sees_unpulled_and_uncached_nodes() {
        let mut s = NodeSequence::lazy((1..=3).map(h));
        assert_eq!(s.item(0).unwrap(), Some(h(1)));
        assert_eq!(s.collect_nodes(), [h(1), h(2), h(3)]);
        assert_eq!(s.as_slice(), &[h(1)]);
        s.set_should_cache_nodes(false).unwrap();
        assert_eq!(s.next_node(), Some(h(1)));
        assert_eq!(s.collect_nodes(), [h(1), h(2), h(3)]);
        assert_eq!(s.next_node(), Some(h(2)));
    }

    #[test]
    fn lazy_sequence_is_read_only_and_pulls_on_demand() {
        let mut s = NodeSequence::lazy((1..=4).map(h));
        assert_eq!(s.add_node(h(9)).unwrap_err().code, ErrorCode::DTMX0003);
        assert_eq!(s.item(1).unwrap(), Some(h(2)));
        assert_eq!(s.as_slice().len(), 2);
        assert!(s.is_fresh());
        assert_eq!(s.get_length().unwrap(), 4);
    }

    #[test]
    fn previous_returns_last_returned() {
        let mut s = NodeSequence::from_vec(vec![h(1), h(2)]);
        assert_eq!(s.next_node(), Some(h(1)));
        assert_eq!(s.next_node(), Some(h(2)));
        assert_eq!(s.previous_node().unwrap(), Some(h(2)));
        assert_eq!(s.next_node(), Some(h(2)));
        assert_eq!(s.next_node(), None);
    }

    #[test]
    fn clone_does_not_disturb_original() {
        let mut s = NodeSequence::from_vec(vec![h(1)]);
        let mut c = s.clone_with_reset();
        c.add_node(h(2)).unwrap();
        assert_eq!(s.as_slice(), &[h(1)]);
        assert_eq!(s.next_node(), Some(h(1)));
        assert_eq!(c.get_length().unwrap(), 2);
    }

    #[test]
    fn frozen_sequence_rejects_mutation() {
        let mut s = NodeSequence::from_vec(vec![h(1)]);
        s.freeze();
        assert_eq!(s.remove_node(h(1)).unwrap_err().code, ErrorCode::DTMX0003);
        assert_eq!(
            s.insert_in_document_order(h(2), &ById).unwrap_err().code,
            ErrorCode::DTMX0003
        );
    }
}

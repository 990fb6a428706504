//! Node identity and the tree-store interface.
//!
//! Nodes are never referenced by pointer. A [`NodeHandle`] packs the id of the
//! tree store that owns the node together with the node's index inside that
//! store; every query goes through the store (see [`TreeStoreManager`]).
use core::cmp::Ordering;
use core::fmt;
use string_cache::DefaultAtom;

mod arena;
pub mod builder;
mod manager;

pub use arena::ArenaTree;
pub use manager::TreeStoreManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    /// Attribute and namespace nodes are not children of their parent.
    pub fn is_child_kind(self) -> bool {
        !matches!(self, NodeKind::Attribute | NodeKind::Namespace | NodeKind::Document)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<DefaultAtom>,
    pub local: DefaultAtom,
    pub ns_uri: Option<DefaultAtom>,
}

impl QName {
    pub fn new(prefix: Option<&str>, local: &str, ns_uri: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(DefaultAtom::from),
            local: DefaultAtom::from(local),
            ns_uri: ns_uri.map(DefaultAtom::from),
        }
    }

    /// Unprefixed name in no namespace.
    pub fn local(local: &str) -> Self {
        Self::new(None, local, None)
    }

    /// Split a lexical `prefix:local` name and attach `ns_uri`.
    pub fn from_lexical(lexical: &str, ns_uri: Option<&str>) -> Self {
        match lexical.split_once(':') {
            Some((prefix, local)) => Self::new(Some(prefix), local, ns_uri),
            None => Self::new(None, lexical, ns_uri),
        }
    }

    /// The name as written: `prefix:local` or `local`.
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{}:{}", p, self.local),
            _ => self.local.to_string(),
        }
    }
}

/// Index of a node inside one tree store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Id of a tree store registered with a [`TreeStoreManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(pub u32);

/// Opaque, copyable node identifier: store id in the upper 32 bits, node id in
/// the lower 32 bits. A handle is a lookup key, it owns nothing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub const NULL: NodeHandle = NodeHandle(u64::MAX);

    pub const fn new(store: StoreId, node: NodeId) -> Self {
        NodeHandle(((store.0 as u64) << 32) | node.0 as u64)
    }

    pub const fn store(self) -> StoreId {
        StoreId((self.0 >> 32) as u32)
    }

    pub const fn node(self) -> NodeId {
        NodeId(self.0 as u32)
    }

    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NodeHandle(NULL)")
        } else {
            write!(f, "NodeHandle({}:{})", self.store().0, self.node().0)
        }
    }
}

/// Document-order comparator over handles.
pub trait DocumentOrder {
    /// True when `a` comes strictly after `b` in document order.
    fn is_node_after(&self, a: NodeHandle, b: NodeHandle) -> bool;
}

/// The external tree-store interface consumed by the engine.
///
/// Stores answer queries for their own node ids; translating between ids and
/// handles is the manager's job. Unknown ids yield `None` / empty results.
pub trait TreeStore: fmt::Debug + Send + Sync {
    fn kind(&self, node: NodeId) -> Option<NodeKind>;
    fn name(&self, node: NodeId) -> Option<QName>;
    fn string_value(&self, node: NodeId) -> String;

    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn first_child(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn previous_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn attributes(&self, node: NodeId) -> Vec<NodeId>;
    fn namespaces(&self, _node: NodeId) -> Vec<NodeId> {
        Vec::new()
    }

    /// True when `a` follows `b` in document order. The default walks the
    /// ancestry of both nodes; stores that know their preorder index should
    /// override it.
    fn is_node_after(&self, a: NodeId, b: NodeId) -> bool {
        compare_by_ancestry(self, a, b) == Ordering::Greater
    }
}

/// Children of `node` collected through the sibling primitives.
pub fn children_of<S: TreeStore + ?Sized>(store: &S, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut cur = store.first_child(node);
    while let Some(c) = cur {
        out.push(c);
        cur = store.next_sibling(c);
    }
    out
}

/// Fallback document-order comparison based on ancestry and sibling order.
///
/// - An ancestor precedes its descendants.
/// - Among nodes sharing a parent, namespaces come first, then attributes,
///   then children, each group in the order the store reports.
/// - Nodes under different roots are ordered by node id.
pub fn compare_by_ancestry<S: TreeStore + ?Sized>(store: &S, a: NodeId, b: NodeId) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    fn path_to_root<S: TreeStore + ?Sized>(store: &S, n: NodeId) -> Vec<NodeId> {
        let mut p = vec![n];
        let mut cur = n;
        while let Some(parent) = store.parent(cur) {
            p.push(parent);
            cur = parent;
        }
        p.reverse();
        p
    }
    let pa = path_to_root(store, a);
    let pb = path_to_root(store, b);
    let len = core::cmp::min(pa.len(), pb.len());
    let mut i = 0usize;
    while i < len && pa[i] == pb[i] {
        i += 1;
    }
    if i == len {
        // one path is a prefix of the other: the shorter one is the ancestor
        return pa.len().cmp(&pb.len());
    }
    if i == 0 {
        return a.cmp(&b);
    }
    let parent = pa[i - 1];
    let mut sibs = store.namespaces(parent);
    sibs.extend(store.attributes(parent));
    sibs.extend(children_of(store, parent));
    let posa = sibs.iter().position(|n| *n == pa[i]);
    let posb = sibs.iter().position(|n| *n == pb[i]);
    match (posa, posb) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(&b),
    }
}

use std::sync::Arc;

use super::{ArenaTree, DocumentOrder, NodeHandle, NodeId, NodeKind, QName, StoreId, TreeStore};

#[derive(Debug)]
enum Entry {
    /// Caller-provided store, shared read-only.
    Shared(Arc<dyn TreeStore>),
    /// Store owned by the manager; result tree fragments are built here.
    Owned(ArenaTree),
    Released,
}

impl Entry {
    fn store(&self) -> Option<&dyn TreeStore> {
        match self {
            Entry::Shared(s) => Some(s.as_ref()),
            Entry::Owned(t) => Some(t as &dyn TreeStore),
            Entry::Released => None,
        }
    }
}

/// Registry of tree stores addressed by [`StoreId`]; translates handles into
/// store queries.
///
/// Ids of released stores are reused by later registrations, so handles into a
/// released store must not outlive it.
#[derive(Debug, Default)]
pub struct TreeStoreManager {
    stores: Vec<Entry>,
    free: Vec<StoreId>,
}

impl TreeStoreManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, entry: Entry) -> StoreId {
        if let Some(id) = self.free.pop() {
            self.stores[id.0 as usize] = entry;
            return id;
        }
        let id = StoreId(self.stores.len() as u32);
        self.stores.push(entry);
        id
    }

    /// Register a shared, externally owned store.
    pub fn register(&mut self, store: Arc<dyn TreeStore>) -> StoreId {
        self.insert(Entry::Shared(store))
    }

    /// Take ownership of an arena tree (e.g. a parsed source document).
    pub fn register_tree(&mut self, tree: ArenaTree) -> StoreId {
        self.insert(Entry::Owned(tree))
    }

    /// Allocate a fresh, empty store usable as a fragment construction target.
    pub fn create_fragment_store(&mut self) -> StoreId {
        let id = self.insert(Entry::Owned(ArenaTree::new()));
        tracing::trace!(store = id.0, "allocated fragment store");
        id
    }

    /// Drop a store. Returns false when the id was not live.
    pub fn release(&mut self, id: StoreId) -> bool {
        match self.stores.get_mut(id.0 as usize) {
            Some(e) if !matches!(e, Entry::Released) => {
                *e = Entry::Released;
                self.free.push(id);
                true
            }
            _ => false,
        }
    }

    /// Number of live stores.
    pub fn store_count(&self) -> usize {
        self.stores
            .iter()
            .filter(|e| !matches!(e, Entry::Released))
            .count()
    }

    pub fn store(&self, id: StoreId) -> Option<&dyn TreeStore> {
        self.stores.get(id.0 as usize).and_then(Entry::store)
    }

    pub fn arena(&self, id: StoreId) -> Option<&ArenaTree> {
        match self.stores.get(id.0 as usize) {
            Some(Entry::Owned(t)) => Some(t),
            _ => None,
        }
    }

    pub fn arena_mut(&mut self, id: StoreId) -> Option<&mut ArenaTree> {
        match self.stores.get_mut(id.0 as usize) {
            Some(Entry::Owned(t)) => Some(t),
            _ => None,
        }
    }

    // ===== handle queries =====

    fn lift(store: StoreId, node: Option<NodeId>) -> Option<NodeHandle> {
        node.map(|n| NodeHandle::new(store, n))
    }

    fn lift_all(store: StoreId, nodes: Vec<NodeId>) -> Vec<NodeHandle> {
        nodes.into_iter().map(|n| NodeHandle::new(store, n)).collect()
    }

    pub fn kind(&self, h: NodeHandle) -> Option<NodeKind> {
        self.store(h.store())?.kind(h.node())
    }

    pub fn name(&self, h: NodeHandle) -> Option<QName> {
        self.store(h.store())?.name(h.node())
    }

    pub fn string_value(&self, h: NodeHandle) -> String {
        self.store(h.store())
            .map(|s| s.string_value(h.node()))
            .unwrap_or_default()
    }

    pub fn parent(&self, h: NodeHandle) -> Option<NodeHandle> {
        Self::lift(h.store(), self.store(h.store())?.parent(h.node()))
    }

    pub fn first_child(&self, h: NodeHandle) -> Option<NodeHandle> {
        Self::lift(h.store(), self.store(h.store())?.first_child(h.node()))
    }

    pub fn next_sibling(&self, h: NodeHandle) -> Option<NodeHandle> {
        Self::lift(h.store(), self.store(h.store())?.next_sibling(h.node()))
    }

    pub fn previous_sibling(&self, h: NodeHandle) -> Option<NodeHandle> {
        Self::lift(h.store(), self.store(h.store())?.previous_sibling(h.node()))
    }

    pub fn children(&self, h: NodeHandle) -> Vec<NodeHandle> {
        match self.store(h.store()) {
            Some(s) => Self::lift_all(h.store(), super::children_of(s, h.node())),
            None => Vec::new(),
        }
    }

    pub fn attributes(&self, h: NodeHandle) -> Vec<NodeHandle> {
        match self.store(h.store()) {
            Some(s) => Self::lift_all(h.store(), s.attributes(h.node())),
            None => Vec::new(),
        }
    }

    pub fn namespaces(&self, h: NodeHandle) -> Vec<NodeHandle> {
        match self.store(h.store()) {
            Some(s) => Self::lift_all(h.store(), s.namespaces(h.node())),
            None => Vec::new(),
        }
    }

    /// Topmost ancestor-or-self of `h`.
    pub fn root(&self, h: NodeHandle) -> NodeHandle {
        let mut cur = h;
        while let Some(p) = self.parent(cur) {
            cur = p;
        }
        cur
    }

    /// Handle of the document node of fragment `index` in an owned store.
    pub fn fragment_root(&self, store: StoreId, index: usize) -> Option<NodeHandle> {
        Self::lift(store, self.arena(store)?.fragment_root(index))
    }
}

impl DocumentOrder for TreeStoreManager {
    /// Same store: the store decides. Different stores: ordered by store id.
    fn is_node_after(&self, a: NodeHandle, b: NodeHandle) -> bool {
        if a.store() == b.store() {
            self.store(a.store())
                .is_some_and(|s| s.is_node_after(a.node(), b.node()))
        } else {
            a.store() > b.store()
        }
    }
}

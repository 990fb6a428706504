//! Pool of fragment stores used as result-tree-fragment construction targets.
//!
//! The pool is a stack of stores with a cursor (`which`) on the entry currently
//! in use. A new entry is only taken when the current one is in the middle of
//! building a fragment, so nested constructions never interleave in one store.
//! `push_context`/`pop_context` bracket a scope: everything built inside it is
//! discarded on pop, through however many entries the scope reached.
use crate::model::{StoreId, TreeStoreManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pushed {
    which: Option<usize>,
    marked: Option<usize>,
}

#[derive(Debug, Default)]
pub struct RtfPool {
    stack: Vec<StoreId>,
    which: Option<usize>,
    last_pushed: Vec<Pushed>,
    /// Global fragment stores; only the last one receives new fragments.
    globals: Vec<StoreId>,
}

impl RtfPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_incomplete(stores: &TreeStoreManager, id: StoreId) -> bool {
        stores.arena(id).is_some_and(|t| t.is_tree_incomplete())
    }

    fn allocate(&mut self, stores: &mut TreeStoreManager) -> usize {
        let id = stores.create_fragment_store();
        self.stack.push(id);
        self.stack.len() - 1
    }

    fn current_index(&mut self, stores: &mut TreeStoreManager) -> usize {
        let idx = match self.which {
            None if self.stack.is_empty() => self.allocate(stores),
            None => 0,
            Some(w) => {
                if Self::is_incomplete(stores, self.stack[w]) {
                    if w + 1 < self.stack.len() {
                        w + 1
                    } else {
                        self.allocate(stores)
                    }
                } else {
                    w
                }
            }
        };
        self.which = Some(idx);
        idx
    }

    /// Store to build the next fragment in: the current entry unless it is
    /// mid-construction, in which case the next entry (allocated on demand).
    pub fn get_rtf_dtm(&mut self, stores: &mut TreeStoreManager) -> StoreId {
        let idx = self.current_index(stores);
        self.stack[idx]
    }

    pub fn push_context(&mut self, stores: &mut TreeStoreManager) {
        let which = self.which;
        let marked = if self.stack.is_empty() {
            None
        } else {
            let idx = self.current_index(stores);
            if let Some(t) = stores.arena_mut(self.stack[idx]) {
                t.push_rewind_mark();
            }
            Some(idx)
        };
        self.last_pushed.push(Pushed { which, marked });
    }

    pub fn pop_context(&mut self, stores: &mut TreeStoreManager) {
        let Some(Pushed { which: previous, marked }) = self.last_pushed.pop() else {
            tracing::warn!("RTF context popped without a matching push");
            return;
        };
        if self.stack.is_empty() {
            return;
        }
        // entries reached inside the scope are rewound (or emptied when unmarked)
        while self.which > previous {
            let Some(w) = self.which else { break };
            if let Some(t) = stores.arena_mut(self.stack[w]) {
                let emptied = t.pop_rewind_mark();
                tracing::trace!(store = self.stack[w].0, emptied, "rewound fragment store");
            }
            self.which = w.checked_sub(1);
        }
        // the mark went onto the entry that was already current at push time
        if let Some(m) = marked
            && marked == previous
            && let Some(t) = stores.arena_mut(self.stack[m])
        {
            t.pop_rewind_mark();
        }
        self.which = previous;
    }

    /// Store for fragments that must outlive every scope. Replaced (not reused)
    /// while the current one is mid-construction.
    pub fn get_global_rtf_dtm(&mut self, stores: &mut TreeStoreManager) -> StoreId {
        match self.globals.last() {
            Some(id) if !Self::is_incomplete(stores, *id) => *id,
            _ => {
                let id = stores.create_fragment_store();
                self.globals.push(id);
                id
            }
        }
    }

    /// Release every store the pool allocated.
    pub fn release_all(&mut self, stores: &mut TreeStoreManager) {
        for id in self.stack.drain(..).chain(self.globals.drain(..)) {
            stores.release(id);
        }
        self.which = None;
        self.last_pushed.clear();
    }

    /// Open `push_context` scopes.
    pub fn depth(&self) -> usize {
        self.last_pushed.len()
    }

    pub fn pool_size(&self) -> usize {
        self.stack.len()
    }

    pub fn which(&self) -> Option<usize> {
        self.which
    }
}

//! Frame-sliced variable stack.
//!
//! Slots live in one flat array. `link(size)` reserves a frame above the
//! current top and records its bottom on a parallel link stack; `unlink()`
//! releases it. Globals are addressed from the absolute base. Reads (and the
//! forcing of thunks, which needs an evaluation context) are done through
//! [`XPathContext`](super::XPathContext).
use std::sync::Arc;

use crate::compiler::Expr;
use crate::model::NodeHandle;
use crate::runtime::{Error, ErrorCode};
use crate::xdm::Value;

/// Deferred variable binding: `expr` evaluated against `context_node` with
/// `frame` as the current frame bottom.
#[derive(Debug, Clone)]
pub struct Thunk {
    pub expr: Arc<Expr>,
    pub context_node: NodeHandle,
    pub frame: usize,
    pub is_global: bool,
}

#[derive(Debug, Clone, Default)]
pub enum VarSlot {
    #[default]
    Unset,
    Value(Value),
    Thunk(Thunk),
    /// A thunk currently being forced; reading it again is a circular reference.
    Forcing,
}

impl VarSlot {
    pub fn is_set(&self) -> bool {
        !matches!(self, VarSlot::Unset)
    }
}

impl From<Value> for VarSlot {
    fn from(v: Value) -> Self {
        VarSlot::Value(v)
    }
}

impl From<Thunk> for VarSlot {
    fn from(t: Thunk) -> Self {
        VarSlot::Thunk(t)
    }
}

/// Cloning copies the slot and link arrays; node-set values keep sharing their
/// storage.
#[derive(Debug, Clone)]
pub struct VariableStack {
    slots: Vec<VarSlot>,
    links: Vec<usize>,
    frame_top: usize,
    current_frame: usize,
    max_links: usize,
    /// Slots below the first frame reserved for globals.
    globals: usize,
}

impl VariableStack {
    pub fn new(initial_slots: usize, initial_links: usize, max_links: usize) -> Self {
        let mut links = Vec::with_capacity(initial_links.max(1));
        links.push(0);
        Self {
            slots: Vec::with_capacity(initial_slots),
            links,
            frame_top: 0,
            current_frame: 0,
            max_links,
            globals: 0,
        }
    }

    /// Keep the first `count` slots for globals; frames are linked above them.
    pub fn reserve_globals(&mut self, count: usize) {
        self.globals = count;
        if self.frame_top < count {
            self.frame_top = count;
        }
        if self.slots.len() < count {
            self.slots.resize(count, VarSlot::Unset);
        }
    }

    pub fn global_slot_count(&self) -> usize {
        self.globals
    }

    /// Reserve `size` fresh slots above the current top and make them the
    /// current frame. Returns the new frame bottom.
    pub fn link(&mut self, size: usize) -> Result<usize, Error> {
        if self.links.len() >= self.max_links {
            return Err(Error::from_code(
                ErrorCode::DTMX0006,
                format!("variable stack exceeded {} frames", self.max_links),
            ));
        }
        let bottom = self.frame_top;
        self.frame_top += size;
        if self.slots.len() < self.frame_top {
            self.slots.resize(self.frame_top, VarSlot::Unset);
        }
        self.slots[bottom..self.frame_top].fill(VarSlot::Unset);
        self.current_frame = bottom;
        self.links.push(bottom);
        Ok(bottom)
    }

    /// Release the most recent frame; the caller's frame becomes current again.
    pub fn unlink(&mut self) {
        if let Some(top) = self.pop_link() {
            self.frame_top = top;
            self.current_frame = self.links.last().copied().unwrap_or(0);
        }
    }

    /// Release the most recent frame and set the current frame explicitly.
    pub fn unlink_to(&mut self, current_frame: usize) {
        if let Some(top) = self.pop_link() {
            self.frame_top = top;
            self.current_frame = current_frame;
        }
    }

    fn pop_link(&mut self) -> Option<usize> {
        if self.links.len() <= 1 {
            tracing::warn!("unlink past the base frame ignored");
            return None;
        }
        self.links.pop()
    }

    pub fn stack_frame(&self) -> usize {
        self.current_frame
    }

    pub fn set_stack_frame(&mut self, frame: usize) {
        self.current_frame = frame;
    }

    pub fn frame_top(&self) -> usize {
        self.frame_top
    }

    /// Number of linked frames including the base frame.
    pub fn link_depth(&self) -> usize {
        self.links.len()
    }

    /// `None` for slots beyond anything ever written.
    pub(crate) fn slot(&self, abs: usize) -> Option<&VarSlot> {
        self.slots.get(abs)
    }

    pub(crate) fn replace(&mut self, abs: usize, slot: VarSlot) -> VarSlot {
        if self.slots.len() <= abs {
            self.slots.resize(abs + 1, VarSlot::Unset);
        }
        core::mem::replace(&mut self.slots[abs], slot)
    }

    /// Write a slot of the current frame.
    pub fn set_local_variable(&mut self, index: usize, slot: impl Into<VarSlot>) {
        self.replace(self.current_frame + index, slot.into());
    }

    /// Write a slot of an explicit frame.
    pub fn set_local_variable_in(&mut self, index: usize, slot: impl Into<VarSlot>, frame: usize) {
        self.replace(frame + index, slot.into());
    }

    pub fn set_global_variable(&mut self, index: usize, slot: impl Into<VarSlot>) {
        self.replace(index, slot.into());
    }

    pub fn is_local_set(&self, index: usize) -> bool {
        self.slot(self.current_frame + index)
            .is_some_and(VarSlot::is_set)
    }

    pub fn is_global_set(&self, index: usize) -> bool {
        self.slot(index).is_some_and(VarSlot::is_set)
    }

    /// Reset `len` slots of the current frame starting at `start` to unset.
    pub fn clear_local_slots(&mut self, start: usize, len: usize) {
        let from = (self.current_frame + start).min(self.slots.len());
        let to = (self.current_frame + start + len).min(self.slots.len());
        self.slots[from..to].fill(VarSlot::Unset);
    }

    /// Back to the single base frame; every slot, globals included, is unset.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.slots.resize(self.globals, VarSlot::Unset);
        self.links.clear();
        self.links.push(0);
        self.frame_top = self.globals;
        self.current_frame = 0;
    }
}

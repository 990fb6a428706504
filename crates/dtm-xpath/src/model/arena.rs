//! Arena-backed tree store.
//!
//! Nodes live in one `Vec` in preorder (namespaces, then attributes, then
//! children), so a node's index is its document-order key. The store holds any
//! number of fragments, each rooted at a document node, and supports streaming
//! construction plus rewind marks that discard everything added after them.
use smallvec::SmallVec;

use super::{NodeId, NodeKind, QName, TreeStore};
use crate::runtime::{Error, ErrorCode};

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: Option<NodeId>,
    /// Index inside the parent's child list (child kinds only).
    sibling_pos: u32,
    children: Vec<NodeId>,
    attributes: SmallVec<[NodeId; 4]>,
    namespaces: SmallVec<[NodeId; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RewindMark {
    nodes: usize,
    fragments: usize,
    open: SmallVec<[NodeId; 8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Child,
    Attribute,
    Namespace,
}

#[derive(Debug, Default, Clone)]
pub struct ArenaTree {
    nodes: Vec<NodeData>,
    fragments: Vec<NodeId>,
    /// Construction stack: fragment root first, then the open elements.
    open: Vec<NodeId>,
    marks: Vec<RewindMark>,
}

fn construction_error(msg: impl Into<String>) -> Error {
    Error::from_code(ErrorCode::FOER0000, msg)
}

impl ArenaTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of fragments (document roots) held, including one under construction.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn fragment_root(&self, index: usize) -> Option<NodeId> {
        self.fragments.get(index).copied()
    }

    /// Root of the most recently started fragment.
    pub fn last_fragment_root(&self) -> Option<NodeId> {
        self.fragments.last().copied()
    }

    /// True while a fragment has been started but not yet ended.
    pub fn is_tree_incomplete(&self) -> bool {
        !self.open.is_empty()
    }

    pub(crate) fn append(
        &mut self,
        parent: Option<NodeId>,
        slot: Slot,
        kind: NodeKind,
        name: Option<QName>,
        value: Option<String>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut sibling_pos = 0u32;
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(p.0 as usize)) {
            match slot {
                Slot::Child => {
                    sibling_pos = p.children.len() as u32;
                    p.children.push(id);
                }
                Slot::Attribute => p.attributes.push(id),
                Slot::Namespace => p.namespaces.push(id),
            }
        }
        self.nodes.push(NodeData {
            kind,
            name,
            value,
            parent,
            sibling_pos,
            children: Vec::new(),
            attributes: SmallVec::new(),
            namespaces: SmallVec::new(),
        });
        if parent.is_none() {
            self.fragments.push(id);
        }
        id
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.0 as usize)
    }

    fn open_top(&self) -> Result<NodeId, Error> {
        self.open
            .last()
            .copied()
            .ok_or_else(|| construction_error("no fragment under construction"))
    }

    /// Open element that may still receive namespaces or attributes.
    fn open_element_without_children(&self, what: &str) -> Result<NodeId, Error> {
        let top = self.open_top()?;
        let data = self.data(top).ok_or_else(|| construction_error("dangling open node"))?;
        if data.kind != NodeKind::Element {
            return Err(construction_error(format!("{what} outside of an element")));
        }
        if !data.children.is_empty() {
            return Err(construction_error(format!(
                "{what} added after child content"
            )));
        }
        Ok(top)
    }

    // ===== streaming construction =====

    pub fn start_fragment(&mut self) -> Result<NodeId, Error> {
        if self.is_tree_incomplete() {
            return Err(construction_error("fragment already under construction"));
        }
        let root = self.append(None, Slot::Child, NodeKind::Document, None, None);
        self.open.push(root);
        Ok(root)
    }

    pub fn start_element(&mut self, name: QName) -> Result<NodeId, Error> {
        let parent = self.open_top()?;
        let id = self.append(Some(parent), Slot::Child, NodeKind::Element, Some(name), None);
        self.open.push(id);
        Ok(id)
    }

    pub fn namespace(&mut self, prefix: &str, uri: &str) -> Result<NodeId, Error> {
        let el = self.open_element_without_children("namespace")?;
        if self.data(el).is_some_and(|d| !d.attributes.is_empty()) {
            return Err(construction_error("namespace added after attributes"));
        }
        Ok(self.append(
            Some(el),
            Slot::Namespace,
            NodeKind::Namespace,
            Some(QName::new(None, prefix, None)),
            Some(uri.to_string()),
        ))
    }

    pub fn attribute(&mut self, name: QName, value: &str) -> Result<NodeId, Error> {
        let el = self.open_element_without_children("attribute")?;
        Ok(self.append(
            Some(el),
            Slot::Attribute,
            NodeKind::Attribute,
            Some(name),
            Some(value.to_string()),
        ))
    }

    pub fn text(&mut self, value: &str) -> Result<NodeId, Error> {
        let parent = self.open_top()?;
        Ok(self.append(Some(parent), Slot::Child, NodeKind::Text, None, Some(value.to_string())))
    }

    pub fn comment(&mut self, value: &str) -> Result<NodeId, Error> {
        let parent = self.open_top()?;
        Ok(self.append(Some(parent), Slot::Child, NodeKind::Comment, None, Some(value.to_string())))
    }

    pub fn processing_instruction(&mut self, target: &str, data: &str) -> Result<NodeId, Error> {
        let parent = self.open_top()?;
        Ok(self.append(
            Some(parent),
            Slot::Child,
            NodeKind::ProcessingInstruction,
            Some(QName::local(target)),
            Some(data.to_string()),
        ))
    }

    pub fn end_element(&mut self) -> Result<(), Error> {
        let top = self.open_top()?;
        if self.data(top).map(|d| d.kind) != Some(NodeKind::Element) {
            return Err(construction_error("end_element without open element"));
        }
        self.open.pop();
        Ok(())
    }

    /// Close the fragment under construction and return its root.
    pub fn end_fragment(&mut self) -> Result<NodeId, Error> {
        match self.open.as_slice() {
            [root] => {
                let root = *root;
                self.open.clear();
                Ok(root)
            }
            [] => Err(construction_error("no fragment under construction")),
            _ => Err(construction_error("end_fragment with unclosed elements")),
        }
    }

    /// Drop the fragment under construction, if any, together with its nodes.
    pub fn abort_fragment(&mut self) {
        let Some(root) = self.open.first().copied() else {
            return;
        };
        self.open.clear();
        self.truncate_nodes(root.0 as usize);
        if self.fragments.last() == Some(&root) {
            self.fragments.pop();
        }
    }

    // ===== rewind marks =====

    pub fn push_rewind_mark(&mut self) {
        self.marks.push(RewindMark {
            nodes: self.nodes.len(),
            fragments: self.fragments.len(),
            open: self.open.iter().copied().collect(),
        });
    }

    /// Discard everything added after the most recent mark. With no mark the
    /// store is emptied. Returns true when the store is empty afterwards.
    pub fn pop_rewind_mark(&mut self) -> bool {
        let mark = self.marks.pop().unwrap_or_default();
        self.open = mark.open.into_vec();
        self.truncate_nodes(mark.nodes);
        self.fragments.truncate(mark.fragments);
        self.nodes.is_empty()
    }

    pub fn mark_depth(&self) -> usize {
        self.marks.len()
    }

    fn truncate_nodes(&mut self, len: usize) {
        if len >= self.nodes.len() {
            return;
        }
        self.nodes.truncate(len);
        // only nodes still open can have gained content after `len`
        let limit = len as u32;
        for id in &self.open {
            if let Some(d) = self.nodes.get_mut(id.0 as usize) {
                d.children.retain(|c| c.0 < limit);
                d.attributes.retain(|c| c.0 < limit);
                d.namespaces.retain(|c| c.0 < limit);
            }
        }
        self.fragments.retain(|f| f.0 < limit);
    }

    /// Remove all nodes, fragments and marks.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.fragments.clear();
        self.open.clear();
        self.marks.clear();
    }
}

impl TreeStore for ArenaTree {
    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.data(node).map(|d| d.kind)
    }

    fn name(&self, node: NodeId) -> Option<QName> {
        self.data(node).and_then(|d| d.name.clone())
    }

    fn string_value(&self, node: NodeId) -> String {
        let Some(d) = self.data(node) else {
            return String::new();
        };
        match d.kind {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                let mut stack: Vec<NodeId> = d.children.iter().rev().copied().collect();
                while let Some(n) = stack.pop() {
                    let Some(c) = self.data(n) else { continue };
                    match c.kind {
                        NodeKind::Text => out.push_str(c.value.as_deref().unwrap_or_default()),
                        NodeKind::Element => stack.extend(c.children.iter().rev().copied()),
                        _ => {}
                    }
                }
                out
            }
            _ => d.value.clone().unwrap_or_default(),
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).and_then(|d| d.parent)
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).and_then(|d| d.children.first().copied())
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let d = self.data(node)?;
        if !d.kind.is_child_kind() {
            return None;
        }
        let parent = self.data(d.parent?)?;
        parent.children.get(d.sibling_pos as usize + 1).copied()
    }

    fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let d = self.data(node)?;
        if !d.kind.is_child_kind() || d.sibling_pos == 0 {
            return None;
        }
        let parent = self.data(d.parent?)?;
        parent.children.get(d.sibling_pos as usize - 1).copied()
    }

    fn attributes(&self, node: NodeId) -> Vec<NodeId> {
        self.data(node).map(|d| d.attributes.to_vec()).unwrap_or_default()
    }

    fn namespaces(&self, node: NodeId) -> Vec<NodeId> {
        self.data(node).map(|d| d.namespaces.to_vec()).unwrap_or_default()
    }

    fn is_node_after(&self, a: NodeId, b: NodeId) -> bool {
        a > b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_fragment(tree: &mut ArenaTree, label: &str) -> NodeId {
        let root = tree.start_fragment().unwrap();
        tree.start_element(QName::local(label)).unwrap();
        tree.attribute(QName::local("id"), label).unwrap();
        tree.text("x").unwrap();
        tree.end_element().unwrap();
        tree.end_fragment().unwrap();
        root
    }

    #[test]
    fn streaming_build_links_nodes() {
        let mut t = ArenaTree::new();
        let root = small_fragment(&mut t, "a");
        let el = t.first_child(root).unwrap();
        assert_eq!(t.kind(el), Some(NodeKind::Element));
        assert_eq!(t.attributes(el).len(), 1);
        assert_eq!(t.string_value(root), "x");
        assert!(!t.is_tree_incomplete());
        assert_eq!(t.fragment_count(), 1);
    }

    #[test]
    fn attribute_after_child_is_rejected() {
        let mut t = ArenaTree::new();
        t.start_fragment().unwrap();
        t.start_element(QName::local("e")).unwrap();
        t.text("t").unwrap();
        let err = t.attribute(QName::local("a"), "v").unwrap_err();
        assert_eq!(err.code, ErrorCode::FOER0000);
    }

    #[test]
    fn rewind_discards_later_fragments() {
        let mut t = ArenaTree::new();
        small_fragment(&mut t, "keep");
        let count = t.node_count();
        t.push_rewind_mark();
        small_fragment(&mut t, "one");
        small_fragment(&mut t, "two");
        assert_eq!(t.fragment_count(), 3);
        assert!(!t.pop_rewind_mark());
        assert_eq!(t.fragment_count(), 1);
        assert_eq!(t.node_count(), count);
    }

    #[test]
    fn rewind_inside_open_element_prunes_children() {
        let mut t = ArenaTree::new();
        let root = t.start_fragment().unwrap();
        let el = t.start_element(QName::local("e")).unwrap();
        t.text("a").unwrap();
        t.push_rewind_mark();
        t.text("b").unwrap();
        t.pop_rewind_mark();
        assert_eq!(t.string_value(el), "a");
        t.end_element().unwrap();
        assert_eq!(t.end_fragment().unwrap(), root);
    }

    #[test]
    fn pop_without_mark_empties_store() {
        let mut t = ArenaTree::new();
        small_fragment(&mut t, "a");
        assert!(t.pop_rewind_mark());
        assert_eq!(t.fragment_count(), 0);
    }

    #[test]
    fn abort_rolls_back_open_fragment() {
        let mut t = ArenaTree::new();
        small_fragment(&mut t, "a");
        let count = t.node_count();
        t.start_fragment().unwrap();
        t.start_element(QName::local("b")).unwrap();
        t.abort_fragment();
        assert_eq!(t.node_count(), count);
        assert_eq!(t.fragment_count(), 1);
        assert!(!t.is_tree_incomplete());
    }
}

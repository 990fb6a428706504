//! Declarative construction of [`ArenaTree`] documents for tests and callers.
//!
//! ```
//! use dtm_xpath::model::builder::{attr, doc, elem, text};
//! use dtm_xpath::model::TreeStore;
//!
//! // <root id="r"><child>Hello</child><child/></root>
//! let tree = doc()
//!     .child(
//!         elem("root")
//!             .attr(attr("id", "r"))
//!             .child(elem("child").child(text("Hello")))
//!             .child(elem("child")),
//!     )
//!     .build();
//! let root = tree.fragment_root(0).unwrap();
//! assert_eq!(tree.string_value(root), "Hello");
//! ```
use super::arena::Slot;
use super::{ArenaTree, NodeId, NodeKind, QName};

#[derive(Debug, Clone)]
pub struct Attr {
    name: QName,
    value: String,
}

#[derive(Debug, Clone)]
pub struct Namespace {
    prefix: String,
    uri: String,
}

#[derive(Debug, Clone)]
enum Item {
    Document,
    Element(QName),
    Text(String),
    Comment(String),
    Pi { target: String, data: String },
}

#[derive(Debug, Clone)]
pub struct NodeBuilder {
    item: Item,
    namespaces: Vec<Namespace>,
    attributes: Vec<Attr>,
    children: Vec<NodeBuilder>,
}

impl NodeBuilder {
    fn new(item: Item) -> Self {
        Self {
            item,
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: NodeBuilder) -> Self {
        self.children.push(child);
        self
    }

    pub fn children<I: IntoIterator<Item = NodeBuilder>>(mut self, children: I) -> Self {
        self.children.extend(children);
        self
    }

    pub fn attr(mut self, attr: Attr) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn namespace(mut self, ns: Namespace) -> Self {
        self.namespaces.push(ns);
        self
    }

    /// Build a new store holding this tree as its only fragment. A non-document
    /// root is wrapped in a document node.
    pub fn build(self) -> ArenaTree {
        let mut tree = ArenaTree::new();
        self.build_into(&mut tree);
        tree
    }

    /// Append this tree as a new fragment of `tree` and return its root.
    pub fn build_into(&self, tree: &mut ArenaTree) -> NodeId {
        match self.item {
            Item::Document => {
                let root = tree.append(None, Slot::Child, NodeKind::Document, None, None);
                for c in &self.children {
                    c.emit(tree, root);
                }
                root
            }
            _ => {
                let root = tree.append(None, Slot::Child, NodeKind::Document, None, None);
                self.emit(tree, root);
                root
            }
        }
    }

    fn emit(&self, tree: &mut ArenaTree, parent: NodeId) {
        let p = Some(parent);
        match &self.item {
            Item::Document => {
                // nested documents flatten into their children
                for c in &self.children {
                    c.emit(tree, parent);
                }
            }
            Item::Element(name) => {
                let el = tree.append(p, Slot::Child, NodeKind::Element, Some(name.clone()), None);
                for ns in &self.namespaces {
                    tree.append(
                        Some(el),
                        Slot::Namespace,
                        NodeKind::Namespace,
                        Some(QName::local(&ns.prefix)),
                        Some(ns.uri.clone()),
                    );
                }
                for a in &self.attributes {
                    tree.append(
                        Some(el),
                        Slot::Attribute,
                        NodeKind::Attribute,
                        Some(a.name.clone()),
                        Some(a.value.clone()),
                    );
                }
                for c in &self.children {
                    c.emit(tree, el);
                }
            }
            Item::Text(v) => {
                tree.append(p, Slot::Child, NodeKind::Text, None, Some(v.clone()));
            }
            Item::Comment(v) => {
                tree.append(p, Slot::Child, NodeKind::Comment, None, Some(v.clone()));
            }
            Item::Pi { target, data } => {
                tree.append(
                    p,
                    Slot::Child,
                    NodeKind::ProcessingInstruction,
                    Some(QName::local(target)),
                    Some(data.clone()),
                );
            }
        }
    }
}

pub fn doc() -> NodeBuilder {
    NodeBuilder::new(Item::Document)
}

/// Element in no namespace; `p:local` keeps the prefix but binds no URI.
pub fn elem(name: &str) -> NodeBuilder {
    NodeBuilder::new(Item::Element(QName::from_lexical(name, None)))
}

pub fn elem_ns(ns_uri: &str, name: &str) -> NodeBuilder {
    NodeBuilder::new(Item::Element(QName::from_lexical(name, Some(ns_uri))))
}

pub fn text(value: &str) -> NodeBuilder {
    NodeBuilder::new(Item::Text(value.to_string()))
}

pub fn comment(value: &str) -> NodeBuilder {
    NodeBuilder::new(Item::Comment(value.to_string()))
}

pub fn pi(target: &str, data: &str) -> NodeBuilder {
    NodeBuilder::new(Item::Pi {
        target: target.to_string(),
        data: data.to_string(),
    })
}

pub fn attr(name: &str, value: &str) -> Attr {
    Attr {
        name: QName::from_lexical(name, None),
        value: value.to_string(),
    }
}

pub fn attr_ns(ns_uri: &str, name: &str, value: &str) -> Attr {
    Attr {
        name: QName::from_lexical(name, Some(ns_uri)),
        value: value.to_string(),
    }
}

pub fn ns(prefix: &str, uri: &str) -> Namespace {
    Namespace {
        prefix: prefix.to_string(),
        uri: uri.to_string(),
    }
}

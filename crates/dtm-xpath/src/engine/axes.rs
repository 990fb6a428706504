//! Axis traversal and node tests. Axes return nodes in axis order: reverse
//! axes yield the nearest node first.
use crate::compiler::NodeTest;
use crate::model::{NodeHandle, NodeKind, TreeStoreManager};
use crate::parser::ast::Axis;

pub(crate) fn axis_nodes(stores: &TreeStoreManager, axis: Axis, node: NodeHandle) -> Vec<NodeHandle> {
    let mut out = Vec::new();
    match axis {
        Axis::SelfAxis => out.push(node),
        Axis::Child => out = stores.children(node),
        Axis::Attribute => out = stores.attributes(node),
        Axis::Namespace => out = stores.namespaces(node),
        Axis::Parent => out.extend(stores.parent(node)),
        Axis::Ancestor => push_ancestors(stores, node, &mut out),
        Axis::AncestorOrSelf => {
            out.push(node);
            push_ancestors(stores, node, &mut out);
        }
        Axis::Descendant => push_descendants(stores, node, &mut out),
        Axis::DescendantOrSelf => {
            out.push(node);
            push_descendants(stores, node, &mut out);
        }
        Axis::FollowingSibling => {
            if is_child_node(stores, node) {
                let mut cur = stores.next_sibling(node);
                while let Some(s) = cur {
                    out.push(s);
                    cur = stores.next_sibling(s);
                }
            }
        }
        Axis::PrecedingSibling => {
            if is_child_node(stores, node) {
                let mut cur = stores.previous_sibling(node);
                while let Some(s) = cur {
                    out.push(s);
                    cur = stores.previous_sibling(s);
                }
            }
        }
        Axis::Following => {
            let mut cur = node;
            // attributes and namespaces are followed by their owner's content
            if !is_child_node(stores, node)
                && let Some(owner) = stores.parent(node)
            {
                push_descendants(stores, owner, &mut out);
                cur = owner;
            }
            loop {
                let mut sib = stores.next_sibling(cur);
                while let Some(s) = sib {
                    out.push(s);
                    push_descendants(stores, s, &mut out);
                    sib = stores.next_sibling(s);
                }
                match stores.parent(cur) {
                    Some(p) => cur = p,
                    None => break,
                }
            }
        }
        Axis::Preceding => {
            let mut cur = node;
            if !is_child_node(stores, node)
                && let Some(owner) = stores.parent(node)
            {
                cur = owner;
            }
            loop {
                let mut sib = stores.previous_sibling(cur);
                while let Some(s) = sib {
                    push_subtree_reversed(stores, s, &mut out);
                    sib = stores.previous_sibling(s);
                }
                match stores.parent(cur) {
                    Some(p) => cur = p,
                    None => break,
                }
            }
        }
    }
    out
}

fn is_child_node(stores: &TreeStoreManager, node: NodeHandle) -> bool {
    stores.kind(node).is_some_and(NodeKind::is_child_kind)
}

fn push_ancestors(stores: &TreeStoreManager, node: NodeHandle, out: &mut Vec<NodeHandle>) {
    let mut cur = stores.parent(node);
    while let Some(p) = cur {
        out.push(p);
        cur = stores.parent(p);
    }
}

/// Preorder descendants, excluding attributes and namespaces.
fn push_descendants(stores: &TreeStoreManager, node: NodeHandle, out: &mut Vec<NodeHandle>) {
    let mut stack: Vec<NodeHandle> = stores.children(node).into_iter().rev().collect();
    while let Some(n) = stack.pop() {
        out.push(n);
        stack.extend(stores.children(n).into_iter().rev());
    }
}

/// `node` and its descendants in reverse document order.
fn push_subtree_reversed(stores: &TreeStoreManager, node: NodeHandle, out: &mut Vec<NodeHandle>) {
    let start = out.len();
    out.push(node);
    push_descendants(stores, node, out);
    out[start..].reverse();
}

pub(crate) fn matches_test(
    stores: &TreeStoreManager,
    axis: Axis,
    test: &NodeTest,
    node: NodeHandle,
) -> bool {
    let Some(kind) = stores.kind(node) else {
        return false;
    };
    match test {
        NodeTest::Node => true,
        NodeTest::Text => kind == NodeKind::Text,
        NodeTest::Comment => kind == NodeKind::Comment,
        NodeTest::ProcessingInstruction(target) => {
            kind == NodeKind::ProcessingInstruction
                && target.as_deref().is_none_or(|t| {
                    stores.name(node).is_some_and(|n| &*n.local == t)
                })
        }
        NodeTest::Wildcard => kind == NodeTest::principal_kind(axis),
        NodeTest::NamespaceWildcard(uri) => {
            kind == NodeTest::principal_kind(axis)
                && stores
                    .name(node)
                    .is_some_and(|n| n.ns_uri.as_deref() == Some(uri.as_str()))
        }
        NodeTest::Name { ns_uri, local } => {
            kind == NodeTest::principal_kind(axis)
                && stores.name(node).is_some_and(|n| {
                    &*n.local == local.as_str() && n.ns_uri.as_deref() == ns_uri.as_deref()
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::{attr, doc, elem, text};

    fn fixture() -> (TreeStoreManager, NodeHandle) {
        let tree = doc()
            .child(
                elem("r")
                    .child(elem("a").attr(attr("id", "1")).child(text("x")))
                    .child(elem("b").child(elem("c")))
                    .child(elem("d")),
            )
            .build();
        let mut stores = TreeStoreManager::new();
        let id = stores.register_tree(tree);
        let root = stores.fragment_root(id, 0).unwrap_or(NodeHandle::NULL);
        (stores, root)
    }

    fn names(stores: &TreeStoreManager, nodes: &[NodeHandle]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| match stores.name(*n) {
                Some(q) => q.local.to_string(),
                None => format!("{:?}", stores.kind(*n).unwrap()),
            })
            .collect()
    }

    fn find(stores: &TreeStoreManager, root: NodeHandle, name: &str) -> NodeHandle {
        axis_nodes(stores, Axis::Descendant, root)
            .into_iter()
            .find(|n| stores.name(*n).is_some_and(|q| &*q.local == name))
            .unwrap()
    }

    #[test]
    fn following_and_preceding() {
        let (stores, root) = fixture();
        let b = find(&stores, root, "b");
        let following = axis_nodes(&stores, Axis::Following, b);
        assert_eq!(names(&stores, &following), ["d"]);
        let preceding = axis_nodes(&stores, Axis::Preceding, b);
        assert_eq!(names(&stores, &preceding), ["Text", "a"]);
    }

    #[test]
    fn attribute_following_starts_with_owner_content() {
        let (stores, root) = fixture();
        let a = find(&stores, root, "a");
        let id = stores.attributes(a)[0];
        let following = axis_nodes(&stores, Axis::Following, id);
        assert_eq!(names(&stores, &following), ["Text", "b", "c", "d"]);
        assert!(axis_nodes(&stores, Axis::FollowingSibling, id).is_empty());
    }

    #[test]
    fn ancestors_nearest_first() {
        let (stores, root) = fixture();
        let c = find(&stores, root, "c");
        let anc = axis_nodes(&stores, Axis::AncestorOrSelf, c);
        assert_eq!(names(&stores, &anc), ["c", "b", "r", "Document"]);
    }
}

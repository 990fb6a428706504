//! Evaluation of the compiled expression tree.
//!
//! Expression nodes never catch errors: they propagate with `?` and every piece
//! of context state they push is held in a scope guard, so the context is
//! restored on all exit paths. Error translation happens once, in
//! [`CompiledPath::execute`](crate::xpath::CompiledPath::execute).
mod axes;
mod compare;
mod functions;

pub(crate) use axes::{axis_nodes, matches_test};

use crate::compiler::{Expr, FragmentNode, Step};
use crate::model::{ArenaTree, NodeHandle, StoreId};
use crate::parser::ast::BinaryOp;
use crate::runtime::{Error, ErrorCode, XPathContext};
use crate::xdm::{NodeSequence, Value};

impl Expr {
    /// Evaluate against the context's current node.
    pub fn execute(&self, ctx: &mut XPathContext) -> Result<Value, Error> {
        match self {
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Variable { var, name } => ctx.get_variable(*var, name),
            Expr::LocationPath(path) => {
                let cn = context_node(ctx)?;
                let start = if path.absolute { ctx.stores().root(cn) } else { cn };
                let mut scope = ctx.iterator_root_scope(start);
                eval_steps(&mut scope, vec![start], &path.steps).map(Value::NodeSet)
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let base = primary.execute(ctx)?;
                if predicates.is_empty() && steps.is_empty() {
                    return Ok(base);
                }
                let mut candidates = base.to_node_set()?.collect_nodes();
                let root = ctx.current_node();
                for pred in predicates {
                    candidates = apply_predicate(ctx, root, candidates, pred)?;
                }
                eval_steps(ctx, candidates, steps).map(Value::NodeSet)
            }
            Expr::Union(a, b) => {
                let left = a.execute(ctx)?.to_node_set()?.collect_nodes();
                let right = b.execute(ctx)?.to_node_set()?.collect_nodes();
                let mut out = NodeSequence::new();
                for n in left.into_iter().chain(right) {
                    out.insert_in_document_order(n, ctx.stores())?;
                }
                Ok(Value::NodeSet(out))
            }
            Expr::Binary { left, op, right } => binary(ctx, left, *op, right),
            Expr::Negate(inner) => {
                let v = inner.execute(ctx)?;
                Ok(Value::Number(-v.to_number(ctx.stores())?))
            }
            Expr::Call { function, args } => functions::call(ctx, *function, args),
            Expr::Construct(nodes) => construct(ctx, nodes),
            Expr::Pattern(pattern) => {
                let node = context_node(ctx)?;
                pattern.score(ctx, node).map(Value::Number)
            }
            Expr::Extension(ext) => ext.execute(ctx),
        }
    }
}

fn context_node(ctx: &XPathContext) -> Result<NodeHandle, Error> {
    let n = ctx.current_node();
    if n.is_null() {
        return Err(Error::from_code(ErrorCode::XPDY0002, "context node is undefined"));
    }
    Ok(n)
}

fn binary(ctx: &mut XPathContext, left: &Expr, op: BinaryOp, right: &Expr) -> Result<Value, Error> {
    match op {
        BinaryOp::Or => {
            if left.execute(ctx)?.to_boolean()? {
                return Ok(Value::Boolean(true));
            }
            Ok(Value::Boolean(right.execute(ctx)?.to_boolean()?))
        }
        BinaryOp::And => {
            if !left.execute(ctx)?.to_boolean()? {
                return Ok(Value::Boolean(false));
            }
            Ok(Value::Boolean(right.execute(ctx)?.to_boolean()?))
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let a = left.execute(ctx)?;
            let b = right.execute(ctx)?;
            compare::compare(ctx.stores(), op, &a, &b).map(Value::Boolean)
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let a = left.execute(ctx)?.to_number(ctx.stores())?;
            let b = right.execute(ctx)?.to_number(ctx.stores())?;
            Ok(Value::Number(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
    }
}

/// Apply `steps` to every node of `start`; each step's result is in document
/// order without duplicates.
pub(crate) fn eval_steps(
    ctx: &mut XPathContext,
    start: Vec<NodeHandle>,
    steps: &[Step],
) -> Result<NodeSequence, Error> {
    let mut current = start;
    for step in steps {
        let mut out = NodeSequence::new();
        for node in current {
            let mut candidates: Vec<NodeHandle> = axis_nodes(ctx.stores(), step.axis, node)
                .into_iter()
                .filter(|c| matches_test(ctx.stores(), step.axis, &step.test, *c))
                .collect();
            for pred in &step.predicates {
                candidates = apply_predicate(ctx, node, candidates, pred)?;
            }
            for c in candidates {
                out.insert_in_document_order(c, ctx.stores())?;
            }
        }
        current = out.as_slice().to_vec();
    }
    Ok(NodeSequence::from_vec(current))
}

/// Keep the candidates for which `pred` holds. Candidates are numbered in the
/// order given (axis order for steps); a numeric result means "position equals".
pub(crate) fn apply_predicate(
    ctx: &mut XPathContext,
    root: NodeHandle,
    candidates: Vec<NodeHandle>,
    pred: &Expr,
) -> Result<Vec<NodeHandle>, Error> {
    let mut scope = ctx.predicate_scope(root, NodeSequence::from_vec(candidates.clone()));
    let mut kept = Vec::with_capacity(candidates.len());
    for (i, node) in candidates.into_iter().enumerate() {
        let pos = i + 1;
        let mut at = scope.position_scope(pos);
        let mut on = at.current_node_scope(node)?;
        let keep = match pred.execute(&mut on)? {
            Value::Number(n) => n == pos as f64,
            other => other.to_boolean()?,
        };
        if keep {
            kept.push(node);
        }
    }
    Ok(kept)
}

fn tree(ctx: &mut XPathContext, store: StoreId) -> Result<&mut ArenaTree, Error> {
    ctx.stores_mut().arena_mut(store).ok_or_else(|| {
        Error::from_code(
            ErrorCode::FOER0000,
            format!("fragment store {} is not available", store.0),
        )
    })
}

/// Build a result tree fragment; a failed construction is rolled back.
fn construct(ctx: &mut XPathContext, nodes: &[FragmentNode]) -> Result<Value, Error> {
    let store = ctx.fragment_target();
    tree(ctx, store)?.start_fragment()?;
    match build_nodes(ctx, store, nodes) {
        Ok(()) => {
            let root = tree(ctx, store)?.end_fragment()?;
            Ok(Value::Fragment(NodeHandle::new(store, root)))
        }
        Err(e) => {
            if let Some(t) = ctx.stores_mut().arena_mut(store) {
                t.abort_fragment();
            }
            Err(e)
        }
    }
}

fn build_nodes(ctx: &mut XPathContext, store: StoreId, nodes: &[FragmentNode]) -> Result<(), Error> {
    for node in nodes {
        match node {
            FragmentNode::Text(s) => {
                tree(ctx, store)?.text(s)?;
            }
            FragmentNode::Comment(s) => {
                tree(ctx, store)?.comment(s)?;
            }
            FragmentNode::ValueOf(e) => {
                let v = e.execute(ctx)?;
                let s = v.to_string_value(ctx.stores())?;
                tree(ctx, store)?.text(&s)?;
            }
            FragmentNode::Element {
                name,
                attributes,
                children,
            } => {
                tree(ctx, store)?.start_element(name.clone())?;
                for (attr_name, value) in attributes {
                    let v = value.execute(ctx)?;
                    let s = v.to_string_value(ctx.stores())?;
                    tree(ctx, store)?.attribute(attr_name.clone(), &s)?;
                }
                build_nodes(ctx, store, children)?;
                tree(ctx, store)?.end_element()?;
            }
        }
    }
    Ok(())
}

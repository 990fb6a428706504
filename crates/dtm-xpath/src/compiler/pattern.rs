//! Match patterns: unions of location paths over the child and attribute axes,
//! matched right to left against a candidate node.
use super::expr::{Expr, NodeTest};
use crate::engine;
use crate::model::{NodeHandle, NodeKind};
use crate::parser::ast::Axis;
use crate::runtime::{Error, XPathContext};

/// Node does not match.
pub const MATCH_SCORE_NONE: f64 = f64::NEG_INFINITY;
/// Single step with a QName test (or a named processing-instruction test).
pub const MATCH_SCORE_QNAME: f64 = 0.0;
/// Single step with a `prefix:*` test.
pub const MATCH_SCORE_NSWILD: f64 = -0.25;
/// Single step with `*` or a node-type test, and the root pattern `/`.
pub const MATCH_SCORE_NODETEST: f64 = -0.5;
/// Anything with predicates or more than one step.
pub const MATCH_SCORE_OTHER: f64 = 0.5;

/// How a step relates to the step on its left (or to the root).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// `/`: the left step matches the parent.
    Parent,
    /// `//`: the left step matches some ancestor.
    Ancestor,
}

#[derive(Debug, Clone)]
pub struct StepPattern {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
    /// Link to the step on the left; for the first step of a rooted pattern,
    /// the link to the document node. `None` on the first step of a relative
    /// pattern.
    pub connector: Option<Connector>,
}

#[derive(Debug, Clone)]
pub struct PathPattern {
    /// Empty for the root pattern `/`.
    pub steps: Vec<StepPattern>,
    pub default_score: f64,
}

#[derive(Debug, Clone)]
pub struct UnionPattern {
    pub alternatives: Vec<PathPattern>,
}

impl PathPattern {
    pub fn new(steps: Vec<StepPattern>) -> Self {
        let default_score = Self::compute_score(&steps);
        Self {
            steps,
            default_score,
        }
    }

    fn compute_score(steps: &[StepPattern]) -> f64 {
        match steps {
            [] => MATCH_SCORE_NODETEST,
            [only] if only.connector.is_none() && only.predicates.is_empty() => match &only.test {
                NodeTest::Name { .. } | NodeTest::ProcessingInstruction(Some(_)) => {
                    MATCH_SCORE_QNAME
                }
                NodeTest::NamespaceWildcard(_) => MATCH_SCORE_NSWILD,
                _ => MATCH_SCORE_NODETEST,
            },
            _ => MATCH_SCORE_OTHER,
        }
    }

    /// Score of `node` against this alternative.
    pub fn score(&self, ctx: &mut XPathContext, node: NodeHandle) -> Result<f64, Error> {
        let matched = match self.steps.len() {
            0 => ctx.stores().kind(node) == Some(NodeKind::Document),
            n => self.matches_from(ctx, node, n - 1)?,
        };
        Ok(if matched {
            self.default_score
        } else {
            MATCH_SCORE_NONE
        })
    }

    fn matches_from(&self, ctx: &mut XPathContext, node: NodeHandle, idx: usize) -> Result<bool, Error> {
        let step = &self.steps[idx];
        if !step.matches_node(ctx, node)? {
            return Ok(false);
        }
        let parent = ctx.stores().parent(node);
        match (idx, step.connector) {
            (_, None) => Ok(true),
            (0, Some(Connector::Parent)) => {
                Ok(parent.is_some_and(|p| ctx.stores().kind(p) == Some(NodeKind::Document)))
            }
            (0, Some(Connector::Ancestor)) => {
                let root = ctx.stores().root(node);
                Ok(root != node && ctx.stores().kind(root) == Some(NodeKind::Document))
            }
            (_, Some(Connector::Parent)) => match parent {
                Some(p) => self.matches_from(ctx, p, idx - 1),
                None => Ok(false),
            },
            (_, Some(Connector::Ancestor)) => {
                let mut cur = parent;
                while let Some(a) = cur {
                    if self.matches_from(ctx, a, idx - 1)? {
                        return Ok(true);
                    }
                    cur = ctx.stores().parent(a);
                }
                Ok(false)
            }
        }
    }
}

impl StepPattern {
    fn matches_node(&self, ctx: &mut XPathContext, node: NodeHandle) -> Result<bool, Error> {
        let kind = ctx.stores().kind(node);
        let on_axis = match self.axis {
            Axis::Attribute => kind == Some(NodeKind::Attribute),
            _ => kind.is_some_and(NodeKind::is_child_kind),
        };
        if !on_axis || !engine::matches_test(ctx.stores(), self.axis, &self.test, node) {
            return Ok(false);
        }
        if self.predicates.is_empty() {
            return Ok(true);
        }
        // proximity position among the siblings passing the same test
        let parent = ctx.stores().parent(node);
        let mut candidates = match parent {
            Some(p) => engine::axis_nodes(ctx.stores(), self.axis, p)
                .into_iter()
                .filter(|c| engine::matches_test(ctx.stores(), self.axis, &self.test, *c))
                .collect(),
            None => vec![node],
        };
        let root = parent.unwrap_or(node);
        for pred in &self.predicates {
            candidates = engine::apply_predicate(ctx, root, candidates, pred)?;
        }
        Ok(candidates.contains(&node))
    }
}

impl UnionPattern {
    /// Highest score over all alternatives.
    pub fn score(&self, ctx: &mut XPathContext, node: NodeHandle) -> Result<f64, Error> {
        let mut best = MATCH_SCORE_NONE;
        for alt in &self.alternatives {
            let s = alt.score(ctx, node)?;
            if s > best {
                best = s;
            }
        }
        Ok(best)
    }
}

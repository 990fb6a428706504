//! Lowering of the parser AST into the executable expression tree.
//!
//! All static lookups happen here: namespace prefixes, variable slots and
//! function arities are fixed once, so evaluation never consults the static
//! context again.
mod expr;
pub mod pattern;

pub use expr::{Expr, ExtensionExpr, FragmentNode, Function, LocationPath, NodeTest, Step};
pub use pattern::{
    Connector, MATCH_SCORE_NODETEST, MATCH_SCORE_NONE, MATCH_SCORE_NSWILD, MATCH_SCORE_OTHER,
    MATCH_SCORE_QNAME, PathPattern, StepPattern, UnionPattern,
};

use crate::parser::{XPathParser, ast};
use crate::runtime::{Error, ErrorCode, StaticContext};
use crate::xdm::ExpandedName;

/// What a compiled path is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompileMode {
    /// Select nodes / compute a value.
    Select = 0,
    /// Test nodes against a pattern; evaluates to a match score.
    Match = 1,
}

impl TryFrom<u8> for CompileMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(CompileMode::Select),
            1 => Ok(CompileMode::Match),
            other => Err(Error::from_code(
                ErrorCode::DTMX0007,
                format!("unsupported compile mode {other}"),
            )),
        }
    }
}

/// Parse and lower `text` against `static_ctx`.
pub fn compile(text: &str, static_ctx: &StaticContext, mode: CompileMode) -> Result<Expr, Error> {
    let ast = XPathParser::parse_to_ast(text)?;
    let lowering = Lowering { static_ctx };
    match mode {
        CompileMode::Select => lowering.expr(&ast),
        CompileMode::Match => lowering.pattern(&ast).map(Expr::Pattern),
    }
}

struct Lowering<'a> {
    static_ctx: &'a StaticContext,
}

impl Lowering<'_> {
    fn namespace(&self, prefix: &str) -> Result<String, Error> {
        self.static_ctx
            .namespaces
            .by_prefix
            .get(prefix)
            .cloned()
            .ok_or_else(|| {
                Error::from_code(
                    ErrorCode::XPST0081,
                    format!("undeclared namespace prefix '{prefix}'"),
                )
            })
    }

    /// Unprefixed names are in no namespace.
    fn expanded(&self, name: &ast::QName) -> Result<ExpandedName, Error> {
        let ns = match &name.prefix {
            Some(p) => Some(self.namespace(p)?),
            None => None,
        };
        Ok(ExpandedName::new(ns, name.local.clone()))
    }

    fn expr(&self, e: &ast::Expr) -> Result<Expr, Error> {
        Ok(match e {
            ast::Expr::String(s) => Expr::String(s.clone()),
            ast::Expr::Number(n) => Expr::Number(*n),
            ast::Expr::VarRef(q) => {
                let name = self.expanded(q)?;
                let var = self.static_ctx.resolve_variable(&name).ok_or_else(|| {
                    Error::from_code(ErrorCode::XPST0008, format!("undeclared variable ${q}"))
                })?;
                Expr::Variable { var, name }
            }
            ast::Expr::FunctionCall { name, args } => {
                let function = match name.prefix {
                    None => Function::lookup(&name.local),
                    Some(_) => None,
                }
                .ok_or_else(|| {
                    Error::from_code(ErrorCode::XPST0017, format!("unknown function {name}()"))
                })?;
                if !function.accepts(args.len()) {
                    return Err(Error::from_code(
                        ErrorCode::XPST0017,
                        format!("{name}() does not take {} argument(s)", args.len()),
                    ));
                }
                Expr::Call {
                    function,
                    args: args.iter().map(|a| self.expr(a)).collect::<Result<_, _>>()?,
                }
            }
            ast::Expr::Path { absolute, steps } => Expr::LocationPath(LocationPath {
                absolute: *absolute,
                steps: self.steps(steps)?,
            }),
            ast::Expr::Filter {
                primary,
                predicates,
                steps,
            } => Expr::Filter {
                primary: Box::new(self.expr(primary)?),
                predicates: self.exprs(predicates)?,
                steps: self.steps(steps)?,
            },
            ast::Expr::Union(a, b) => Expr::Union(Box::new(self.expr(a)?), Box::new(self.expr(b)?)),
            ast::Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(self.expr(left)?),
                op: *op,
                right: Box::new(self.expr(right)?),
            },
            ast::Expr::Negate(inner) => Expr::Negate(Box::new(self.expr(inner)?)),
        })
    }

    fn exprs(&self, es: &[ast::Expr]) -> Result<Vec<Expr>, Error> {
        es.iter().map(|e| self.expr(e)).collect()
    }

    fn steps(&self, steps: &[ast::Step]) -> Result<Vec<Step>, Error> {
        steps.iter().map(|s| self.step(s)).collect()
    }

    fn step(&self, s: &ast::Step) -> Result<Step, Error> {
        Ok(Step {
            axis: s.axis,
            test: self.node_test(&s.test)?,
            predicates: self.exprs(&s.predicates)?,
        })
    }

    fn node_test(&self, t: &ast::NodeTest) -> Result<NodeTest, Error> {
        Ok(match t {
            ast::NodeTest::Name(q) => {
                let name = self.expanded(q)?;
                NodeTest::Name {
                    ns_uri: name.ns_uri,
                    local: name.local,
                }
            }
            ast::NodeTest::NamespaceWildcard(p) => NodeTest::NamespaceWildcard(self.namespace(p)?),
            ast::NodeTest::Wildcard => NodeTest::Wildcard,
            ast::NodeTest::Node => NodeTest::Node,
            ast::NodeTest::Text => NodeTest::Text,
            ast::NodeTest::Comment => NodeTest::Comment,
            ast::NodeTest::ProcessingInstruction(t) => NodeTest::ProcessingInstruction(t.clone()),
        })
    }

    // ===== patterns =====

    fn pattern(&self, e: &ast::Expr) -> Result<UnionPattern, Error> {
        let mut alternatives = Vec::new();
        self.collect_alternatives(e, &mut alternatives)?;
        Ok(UnionPattern { alternatives })
    }

    fn collect_alternatives(&self, e: &ast::Expr, out: &mut Vec<PathPattern>) -> Result<(), Error> {
        match e {
            ast::Expr::Union(a, b) => {
                self.collect_alternatives(a, out)?;
                self.collect_alternatives(b, out)
            }
            ast::Expr::Path { absolute, steps } => {
                out.push(self.path_pattern(*absolute, steps)?);
                Ok(())
            }
            _ => Err(not_a_pattern("only location paths can be used as match patterns")),
        }
    }

    fn path_pattern(&self, absolute: bool, steps: &[ast::Step]) -> Result<PathPattern, Error> {
        let mut out: Vec<StepPattern> = Vec::with_capacity(steps.len());
        let mut pending = absolute.then_some(Connector::Parent);
        for s in steps {
            if *s == ast::Step::descendant_or_self_node() {
                pending = Some(Connector::Ancestor);
                continue;
            }
            if !matches!(s.axis, ast::Axis::Child | ast::Axis::Attribute) {
                return Err(not_a_pattern(format!(
                    "axis {}:: is not allowed in a match pattern",
                    s.axis.name()
                )));
            }
            let connector = if out.is_empty() {
                pending.take()
            } else {
                Some(pending.take().unwrap_or(Connector::Parent))
            };
            out.push(StepPattern {
                axis: s.axis,
                test: self.node_test(&s.test)?,
                predicates: self.exprs(&s.predicates)?,
                connector,
            });
        }
        if pending.is_some() && !out.is_empty() {
            return Err(not_a_pattern("pattern cannot end with '//'"));
        }
        Ok(PathPattern::new(out))
    }
}

fn not_a_pattern(msg: impl Into<String>) -> Error {
    Error::from_code(ErrorCode::XPST0003, msg)
}

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;

use crate::runtime::{Error, ErrorCode};

pub mod ast;

#[derive(pest_derive::Parser)]
#[grammar = "xpath1.pest"]
pub struct XPathParser;

fn syntax_error(message: impl Into<String>) -> Error {
    Error::from_code(ErrorCode::XPST0003, message)
}

fn unexpected(pair: &Pair<Rule>) -> Error {
    let (line, col) = pair.as_span().start_pos().line_col();
    syntax_error(format!(
        "unexpected {:?} '{}' at {line}:{col}",
        pair.as_rule(),
        pair.as_str()
    ))
}

fn next_inner<'i>(pairs: &mut pest::iterators::Pairs<'i, Rule>, parent: &str) -> Result<Pair<'i, Rule>, Error> {
    pairs
        .next()
        .ok_or_else(|| syntax_error(format!("incomplete {parent}")))
}

impl XPathParser {
    /// Parse an XPath 1.0 expression into its AST. Any syntax error is XPST0003.
    pub fn parse_to_ast(input: &str) -> Result<ast::Expr, Error> {
        let mut pairs = Self::parse(Rule::xpath, input).map_err(|e| {
            let (line, col) = match e.line_col {
                LineColLocation::Pos(p) => p,
                LineColLocation::Span(p, _) => p,
            };
            syntax_error(format!(
                "invalid expression '{input}' at {line}:{col}: {}",
                e.variant.message()
            ))
        })?;
        let root = next_inner(&mut pairs, "expression")?;
        let mut inner = root.into_inner();
        let expr = next_inner(&mut inner, "expression")?;
        Self::build_expr(expr)
    }

    /// Walk down to the first terminal token of an operator pair.
    fn first_token_rule(pair: &Pair<Rule>) -> Rule {
        let mut current = pair.clone();
        loop {
            match current.clone().into_inner().next() {
                Some(next) => current = next,
                None => return current.as_rule(),
            }
        }
    }

    fn binary_op(pair: &Pair<Rule>) -> Option<ast::BinaryOp> {
        use ast::BinaryOp::*;
        Some(match Self::first_token_rule(pair) {
            Rule::K_OR => Or,
            Rule::K_AND => And,
            Rule::OP_EQ => Eq,
            Rule::OP_NE => Ne,
            Rule::OP_LT => Lt,
            Rule::OP_LTE => Le,
            Rule::OP_GT => Gt,
            Rule::OP_GTE => Ge,
            Rule::OP_PLUS => Add,
            Rule::OP_MINUS => Sub,
            Rule::OP_STAR => Mul,
            Rule::K_DIV => Div,
            Rule::K_MOD => Mod,
            _ => return None,
        })
    }

    fn build_expr(pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        match pair.as_rule() {
            Rule::expr
            | Rule::path_expr
            | Rule::location_path
            | Rule::primary_expr
            | Rule::paren_expr => {
                let name = format!("{:?}", pair.as_rule());
                let mut inner = pair.into_inner();
                Self::build_expr(next_inner(&mut inner, &name)?)
            }
            Rule::or_expr
            | Rule::and_expr
            | Rule::equality_expr
            | Rule::relational_expr
            | Rule::additive_expr
            | Rule::multiplicative_expr => Self::fold_chain(pair),
            Rule::unary_expr => {
                let mut negations = 0usize;
                let mut operand = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::OP_MINUS => negations += 1,
                        _ => operand = Some(Self::build_expr(p)?),
                    }
                }
                let mut e = operand.ok_or_else(|| syntax_error("missing operand of unary minus"))?;
                for _ in 0..negations {
                    e = ast::Expr::Negate(Box::new(e));
                }
                Ok(e)
            }
            Rule::union_expr => {
                let mut acc: Option<ast::Expr> = None;
                for p in pair.into_inner() {
                    if p.as_rule() == Rule::OP_PIPE {
                        continue;
                    }
                    let rhs = Self::build_expr(p)?;
                    acc = Some(match acc {
                        None => rhs,
                        Some(lhs) => ast::Expr::Union(Box::new(lhs), Box::new(rhs)),
                    });
                }
                acc.ok_or_else(|| syntax_error("empty union"))
            }
            Rule::filter_path => {
                let mut inner = pair.into_inner();
                let base = Self::build_filter(next_inner(&mut inner, "filter expression")?)?;
                let Some(sep) = inner.next() else {
                    return Ok(base);
                };
                let mut steps = Vec::new();
                if Self::first_token_rule(&sep) == Rule::OP_DSLASH {
                    steps.push(ast::Step::descendant_or_self_node());
                }
                steps.extend(Self::build_relative(next_inner(&mut inner, "path")?)?);
                Ok(match base {
                    ast::Expr::Filter {
                        primary,
                        predicates,
                        steps: mut existing,
                    } => {
                        existing.extend(steps);
                        ast::Expr::Filter {
                            primary,
                            predicates,
                            steps: existing,
                        }
                    }
                    other => ast::Expr::Filter {
                        primary: Box::new(other),
                        predicates: Vec::new(),
                        steps,
                    },
                })
            }
            Rule::absolute_location_path => {
                let mut inner = pair.into_inner();
                let lead = next_inner(&mut inner, "absolute path")?;
                let mut steps = Vec::new();
                if lead.as_rule() == Rule::OP_DSLASH {
                    steps.push(ast::Step::descendant_or_self_node());
                }
                if let Some(rel) = inner.next() {
                    steps.extend(Self::build_relative(rel)?);
                }
                Ok(ast::Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Rule::relative_location_path => Ok(ast::Expr::Path {
                absolute: false,
                steps: Self::build_relative(pair)?,
            }),
            Rule::literal => Ok(ast::Expr::String(
                pair.into_inner()
                    .next()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default(),
            )),
            Rule::number => pair
                .as_str()
                .parse::<f64>()
                .map(ast::Expr::Number)
                .map_err(|_| unexpected(&pair)),
            Rule::var_ref => {
                let mut inner = pair.into_inner();
                let name = next_inner(&mut inner, "variable reference")?;
                Ok(ast::Expr::VarRef(ast::QName::parse(name.as_str())))
            }
            Rule::function_call => {
                let mut inner = pair.into_inner();
                let name = ast::QName::parse(next_inner(&mut inner, "function call")?.as_str());
                let args = inner.map(Self::build_expr).collect::<Result<Vec<_>, _>>()?;
                Ok(ast::Expr::FunctionCall { name, args })
            }
            _ => Err(unexpected(&pair)),
        }
    }

    /// Left-associative fold of `operand (op operand)*`.
    fn fold_chain(pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.into_inner();
        let mut acc = Self::build_expr(next_inner(&mut inner, "operand")?)?;
        while let Some(op_pair) = inner.next() {
            let op = Self::binary_op(&op_pair).ok_or_else(|| unexpected(&op_pair))?;
            let rhs = Self::build_expr(next_inner(&mut inner, "right operand")?)?;
            acc = ast::Expr::Binary {
                left: Box::new(acc),
                op,
                right: Box::new(rhs),
            };
        }
        Ok(acc)
    }

    fn build_filter(pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.into_inner();
        let primary = Self::build_expr(next_inner(&mut inner, "primary expression")?)?;
        let predicates = inner
            .map(Self::build_predicate)
            .collect::<Result<Vec<_>, _>>()?;
        if predicates.is_empty() {
            return Ok(primary);
        }
        Ok(ast::Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps: Vec::new(),
        })
    }

    fn build_predicate(pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.into_inner();
        Self::build_expr(next_inner(&mut inner, "predicate")?)
    }

    fn build_relative(pair: Pair<Rule>) -> Result<Vec<ast::Step>, Error> {
        let mut steps = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::step => steps.push(Self::build_step(p)?),
                Rule::path_sep => {
                    if Self::first_token_rule(&p) == Rule::OP_DSLASH {
                        steps.push(ast::Step::descendant_or_self_node());
                    }
                }
                _ => return Err(unexpected(&p)),
            }
        }
        Ok(steps)
    }

    fn build_step(pair: Pair<Rule>) -> Result<ast::Step, Error> {
        let mut axis = ast::Axis::Child;
        let mut test = None;
        let mut predicates = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::abbreviated_step => {
                    let axis = match Self::first_token_rule(&p) {
                        Rule::OP_DOTDOT => ast::Axis::Parent,
                        _ => ast::Axis::SelfAxis,
                    };
                    return Ok(ast::Step {
                        axis,
                        test: ast::NodeTest::Node,
                        predicates: Vec::new(),
                    });
                }
                Rule::axis_specifier => {
                    let spec = p.clone().into_inner().next();
                    axis = match spec {
                        Some(s) if s.as_rule() == Rule::axis_name => {
                            ast::Axis::from_name(s.as_str()).ok_or_else(|| unexpected(&s))?
                        }
                        _ => ast::Axis::Attribute,
                    };
                }
                Rule::node_test => test = Some(Self::build_node_test(p)?),
                Rule::predicate => predicates.push(Self::build_predicate(p)?),
                _ => return Err(unexpected(&p)),
            }
        }
        Ok(ast::Step {
            axis,
            test: test.ok_or_else(|| syntax_error("step without node test"))?,
            predicates,
        })
    }

    fn build_node_test(pair: Pair<Rule>) -> Result<ast::NodeTest, Error> {
        let mut inner = pair.into_inner();
        let test = next_inner(&mut inner, "node test")?;
        match test.as_rule() {
            Rule::node_type_test => {
                let kind = next_inner(&mut test.clone().into_inner(), "node type")?;
                Ok(match kind.as_str() {
                    "comment" => ast::NodeTest::Comment,
                    "text" => ast::NodeTest::Text,
                    _ => ast::NodeTest::Node,
                })
            }
            Rule::pi_test => {
                let target = test
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::literal)
                    .map(|lit| {
                        lit.into_inner()
                            .next()
                            .map(|s| s.as_str().to_string())
                            .unwrap_or_default()
                    });
                Ok(ast::NodeTest::ProcessingInstruction(target))
            }
            Rule::name_test => {
                let name = next_inner(&mut test.into_inner(), "name test")?;
                match name.as_rule() {
                    Rule::wildcard => Ok(ast::NodeTest::Wildcard),
                    Rule::ns_wildcard => {
                        let prefix = next_inner(&mut name.into_inner(), "namespace wildcard")?;
                        Ok(ast::NodeTest::NamespaceWildcard(prefix.as_str().to_string()))
                    }
                    Rule::qname => Ok(ast::NodeTest::Name(ast::QName::parse(name.as_str()))),
                    _ => Err(unexpected(&name)),
                }
            }
            _ => Err(unexpected(&test)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;

    fn parse(s: &str) -> Expr {
        XPathParser::parse_to_ast(s).unwrap()
    }

    #[test]
    fn abbreviations_expand() {
        let Expr::Path { absolute, steps } = parse("//a/@b") else {
            panic!("expected path")
        };
        assert!(absolute);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0], Step::descendant_or_self_node());
        assert_eq!(steps[2].axis, Axis::Attribute);
        assert_eq!(steps[2].test, NodeTest::Name(QName::parse("b")));
    }

    #[test]
    fn operators_are_left_associative() {
        let Expr::Binary { left, op, .. } = parse("1 - 2 - 3") else {
            panic!("expected binary")
        };
        assert_eq!(op, BinaryOp::Sub);
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn keywords_and_names_disambiguate() {
        assert!(matches!(parse("div div div"), Expr::Binary { op: BinaryOp::Div, .. }));
        assert!(matches!(parse("a * b"), Expr::Binary { op: BinaryOp::Mul, .. }));
        assert!(matches!(parse("text()"), Expr::Path { .. }));
        assert!(matches!(parse("count(a)"), Expr::FunctionCall { .. }));
        assert!(matches!(parse("order"), Expr::Path { .. }));
    }

    #[test]
    fn root_alone_is_an_empty_absolute_path() {
        assert_eq!(
            parse("/"),
            Expr::Path {
                absolute: true,
                steps: vec![]
            }
        );
    }

    #[test]
    fn filter_with_trailing_steps() {
        let Expr::Filter { predicates, steps, .. } = parse("$x[1]//b") else {
            panic!("expected filter")
        };
        assert_eq!(predicates.len(), 1);
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn syntax_errors_are_xpst0003() {
        for bad in ["a[", "1 +", "@", "foo(", "a::b"] {
            let err = XPathParser::parse_to_ast(bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::XPST0003, "{bad}");
        }
    }
}

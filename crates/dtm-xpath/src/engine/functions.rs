//! Core function library (XPath 1.0 subset plus `current()`).
use crate::compiler::{Expr, Function};
use crate::model::NodeHandle;
use crate::runtime::{Error, ErrorCode, XPathContext};
use crate::xdm::{NodeSequence, Value, parse_number};

fn context_node(ctx: &XPathContext) -> Result<NodeHandle, Error> {
    let n = ctx.current_node();
    if n.is_null() {
        return Err(Error::from_code(ErrorCode::XPDY0002, "context node is undefined"));
    }
    Ok(n)
}

/// First node of the argument, or the context node when there is none.
fn node_arg(ctx: &mut XPathContext, args: &[Expr]) -> Result<Option<NodeHandle>, Error> {
    match args.first() {
        None => context_node(ctx).map(Some),
        Some(a) => {
            let mut set = a.execute(ctx)?.to_node_set()?;
            Ok(set.next_node())
        }
    }
}

fn set_arg(ctx: &mut XPathContext, args: &[Expr]) -> Result<NodeSequence, Error> {
    let a = args
        .first()
        .ok_or_else(|| Error::from_code(ErrorCode::XPST0017, "missing node-set argument"))?;
    a.execute(ctx)?.to_node_set()
}

fn string_arg(ctx: &mut XPathContext, args: &[Expr], i: usize) -> Result<String, Error> {
    match args.get(i) {
        Some(a) => {
            let v = a.execute(ctx)?;
            v.to_string_value(ctx.stores())
        }
        None => {
            let n = context_node(ctx)?;
            Ok(ctx.stores().string_value(n))
        }
    }
}

fn number_arg(ctx: &mut XPathContext, args: &[Expr], i: usize) -> Result<f64, Error> {
    match args.get(i) {
        Some(a) => {
            let v = a.execute(ctx)?;
            v.to_number(ctx.stores())
        }
        None => {
            let n = context_node(ctx)?;
            Ok(parse_number(&ctx.stores().string_value(n)))
        }
    }
}

fn boolean_arg(ctx: &mut XPathContext, args: &[Expr], i: usize) -> Result<bool, Error> {
    match args.get(i) {
        Some(a) => a.execute(ctx)?.to_boolean(),
        None => Ok(false),
    }
}

/// XPath `round`: halves go towards positive infinity, -0.5..0 rounds to -0.
fn round(x: f64) -> f64 {
    if x.is_nan() || x.is_infinite() {
        x
    } else if (-0.5..0.0).contains(&x) {
        -0.0
    } else {
        (x + 0.5).floor()
    }
}

pub(crate) fn call(ctx: &mut XPathContext, function: Function, args: &[Expr]) -> Result<Value, Error> {
    Ok(match function {
        Function::Last => Value::Number(ctx.context_size()? as f64),
        Function::Position => Value::Number(ctx.context_position() as f64),
        Function::Count => Value::Number(set_arg(ctx, args)?.collect_nodes().len() as f64),
        Function::LocalName | Function::NamespaceUri | Function::Name => {
            let name = node_arg(ctx, args)?.and_then(|n| ctx.stores().name(n));
            let s = match (function, name) {
                (_, None) => String::new(),
                (Function::LocalName, Some(q)) => q.local.to_string(),
                (Function::NamespaceUri, Some(q)) => {
                    q.ns_uri.map(|u| u.to_string()).unwrap_or_default()
                }
                (_, Some(q)) => q.lexical(),
            };
            Value::String(s)
        }
        Function::String => Value::String(string_arg(ctx, args, 0)?),
        Function::Concat => {
            let mut out = String::new();
            for i in 0..args.len() {
                out.push_str(&string_arg(ctx, args, i)?);
            }
            Value::String(out)
        }
        Function::StartsWith => {
            let s = string_arg(ctx, args, 0)?;
            let prefix = string_arg(ctx, args, 1)?;
            Value::Boolean(s.starts_with(&prefix))
        }
        Function::Contains => {
            let s = string_arg(ctx, args, 0)?;
            let needle = string_arg(ctx, args, 1)?;
            Value::Boolean(s.contains(&needle))
        }
        Function::StringLength => Value::Number(string_arg(ctx, args, 0)?.chars().count() as f64),
        Function::NormalizeSpace => {
            let s = string_arg(ctx, args, 0)?;
            Value::String(
                s.split(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'))
                    .filter(|w| !w.is_empty())
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        }
        Function::Boolean => Value::Boolean(boolean_arg(ctx, args, 0)?),
        Function::Not => Value::Boolean(!boolean_arg(ctx, args, 0)?),
        Function::True => Value::Boolean(true),
        Function::False => Value::Boolean(false),
        Function::Number => Value::Number(number_arg(ctx, args, 0)?),
        Function::Sum => {
            let mut set = set_arg(ctx, args)?;
            let mut total = 0.0;
            while let Some(n) = set.next_node() {
                total += parse_number(&ctx.stores().string_value(n));
            }
            Value::Number(total)
        }
        Function::Floor => Value::Number(number_arg(ctx, args, 0)?.floor()),
        Function::Ceiling => Value::Number(number_arg(ctx, args, 0)?.ceil()),
        Function::Round => Value::Number(round(number_arg(ctx, args, 0)?)),
        Function::Current => {
            let n = ctx.current_expression_node();
            if n.is_null() {
                Value::NodeSet(NodeSequence::new())
            } else {
                Value::NodeSet(NodeSequence::singleton(n))
            }
        }
        Function::FunctionAvailable => {
            let name = string_arg(ctx, args, 0)?;
            Value::Boolean(Function::lookup(&name).is_some())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::round;

    #[test]
    fn rounding_follows_xpath() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert!(round(-0.2).is_sign_negative());
        assert!(round(f64::NAN).is_nan());
    }
}

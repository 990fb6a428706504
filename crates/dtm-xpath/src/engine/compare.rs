//! XPath 1.0 comparisons. Node-set operands compare existentially: the result
//! is true if some member (or pair of members) satisfies the comparison.
use crate::model::TreeStoreManager;
use crate::parser::ast::BinaryOp;
use crate::runtime::Error;
use crate::xdm::{Value, parse_number};

fn cmp_numbers(op: BinaryOp, a: f64, b: f64) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        _ => false,
    }
}

fn is_equality(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::Eq | BinaryOp::Ne)
}

/// `op` with its operands swapped (`a < b` is `b > a`).
fn mirrored(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        other => other,
    }
}

fn member_strings(stores: &TreeStoreManager, v: &Value) -> Result<Vec<String>, Error> {
    Ok(v.to_node_set()?
        .collect_nodes()
        .into_iter()
        .map(|n| stores.string_value(n))
        .collect())
}

fn cmp_atomic(stores: &TreeStoreManager, op: BinaryOp, a: &Value, b: &Value) -> Result<bool, Error> {
    if is_equality(op) {
        let eq = match (a, b) {
            (Value::Boolean(_), _) | (_, Value::Boolean(_)) => a.to_boolean()? == b.to_boolean()?,
            (Value::Number(_), _) | (_, Value::Number(_)) => {
                a.to_number(stores)? == b.to_number(stores)?
            }
            _ => a.to_string_value(stores)? == b.to_string_value(stores)?,
        };
        return Ok(if op == BinaryOp::Eq { eq } else { !eq });
    }
    Ok(cmp_numbers(op, a.to_number(stores)?, b.to_number(stores)?))
}

/// Node set on the left, anything on the right.
fn cmp_node_set(stores: &TreeStoreManager, op: BinaryOp, set: &Value, other: &Value) -> Result<bool, Error> {
    let left = member_strings(stores, set)?;
    match other {
        Value::NodeSet(_) | Value::Fragment(_) => {
            let right = member_strings(stores, other)?;
            if is_equality(op) {
                Ok(left
                    .iter()
                    .any(|l| right.iter().any(|r| (l == r) == (op == BinaryOp::Eq))))
            } else {
                let right: Vec<f64> = right.iter().map(|r| parse_number(r)).collect();
                Ok(left.iter().any(|l| {
                    let l = parse_number(l);
                    right.iter().any(|r| cmp_numbers(op, l, *r))
                }))
            }
        }
        Value::Number(n) => Ok(left.iter().any(|l| cmp_numbers(op, parse_number(l), *n))),
        Value::String(s) if is_equality(op) => {
            Ok(left.iter().any(|l| (l == s) == (op == BinaryOp::Eq)))
        }
        Value::String(s) => {
            let n = parse_number(s);
            Ok(left.iter().any(|l| cmp_numbers(op, parse_number(l), n)))
        }
        Value::Boolean(b) => {
            let lb = !left.is_empty();
            Ok(if is_equality(op) {
                (lb == *b) == (op == BinaryOp::Eq)
            } else {
                cmp_numbers(op, f64::from(u8::from(lb)), f64::from(u8::from(*b)))
            })
        }
    }
}

pub(crate) fn compare(stores: &TreeStoreManager, op: BinaryOp, a: &Value, b: &Value) -> Result<bool, Error> {
    match (a.is_node_set(), b.is_node_set()) {
        (true, _) => cmp_node_set(stores, op, a, b),
        (false, true) => cmp_node_set(stores, mirrored(op), b, a),
        (false, false) => cmp_atomic(stores, op, a, b),
    }
}

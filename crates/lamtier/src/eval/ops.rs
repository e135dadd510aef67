//! Operator semantics shared by the interpreter and the compiler.
//!
//! Integer arithmetic wraps. Mixing an int and a float promotes to float.

use smol_str::format_smolstr;

use super::error::EvalError;
use crate::ast::{BinaryOp, UnaryOp};
use crate::value::Value;

pub(crate) fn truthy(op: &str, value: &Value) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| EvalError::operands(op, &[value]))
}

pub(crate) fn unary(op: UnaryOp, value: &Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, _) => Err(EvalError::operands("-", &[value])),
        (UnaryOp::Not, _) => Err(EvalError::operands("!", &[value])),
    }
}

fn float_pair(lhs: &Value, rhs: &Value) -> Option<(f64, f64)> {
    match (lhs, rhs) {
        (Value::Float(a), Value::Float(b)) => Some((*a, *b)),
        (Value::Int(a), Value::Float(b)) => Some((*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Some((*a, *b as f64)),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let (a, b) = (*a, *b);
        return match op {
            BinaryOp::Add => Ok(Value::Int(a.wrapping_add(b))),
            BinaryOp::Sub => Ok(Value::Int(a.wrapping_sub(b))),
            BinaryOp::Mul => Ok(Value::Int(a.wrapping_mul(b))),
            BinaryOp::Div if b == 0 => Err(EvalError::ZeroDivision),
            BinaryOp::Div => Ok(Value::Int(a.wrapping_div(b))),
            BinaryOp::Rem if b == 0 => Err(EvalError::ZeroDivision),
            BinaryOp::Rem => Ok(Value::Int(a.wrapping_rem(b))),
            _ => Err(EvalError::operands(op.to_string(), &[lhs, rhs])),
        };
    }

    if let (BinaryOp::Add, Value::Str(a), Value::Str(b)) = (op, lhs, rhs) {
        return Ok(Value::Str(format_smolstr!("{a}{b}")));
    }

    let (a, b) = float_pair(lhs, rhs).ok_or_else(|| EvalError::operands(op.to_string(), &[lhs, rhs]))?;
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => Err(EvalError::ZeroDivision),
        BinaryOp::Div => Ok(Value::Float(a / b)),
        BinaryOp::Rem => Ok(Value::Float(a % b)),
        _ => Err(EvalError::operands(op.to_string(), &[lhs, rhs])),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => float_pair(lhs, rhs).and_then(|(a, b)| a.partial_cmp(&b)),
    };
    let ordering = ordering.ok_or_else(|| EvalError::operands(op.to_string(), &[lhs, rhs]))?;
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}

/// Applies a binary operator to two evaluated operands. `And`/`Or` are
/// evaluated eagerly here; callers short-circuit before reaching this.
pub(crate) fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arithmetic(op, lhs, rhs),
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, lhs, rhs),
        BinaryOp::And | BinaryOp::Or => match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) if op == BinaryOp::And => Ok(Value::Bool(*a && *b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            _ => Err(EvalError::operands(op.to_string(), &[lhs, rhs])),
        },
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::int_add(BinaryOp::Add, Value::Int(2), Value::Int(3), Ok(Value::Int(5)))]
    #[case::wrapping(BinaryOp::Add, Value::Int(i64::MAX), Value::Int(1), Ok(Value::Int(i64::MIN)))]
    #[case::promote(BinaryOp::Mul, Value::Int(2), Value::Float(1.5), Ok(Value::Float(3.0)))]
    #[case::concat(BinaryOp::Add, Value::from("ab"), Value::from("cd"), Ok(Value::from("abcd")))]
    #[case::int_div_zero(BinaryOp::Div, Value::Int(1), Value::Int(0), Err(EvalError::ZeroDivision))]
    #[case::float_rem_zero(BinaryOp::Rem, Value::Float(1.0), Value::Float(0.0), Err(EvalError::ZeroDivision))]
    #[case::lt(BinaryOp::Lt, Value::Int(1), Value::Float(1.5), Ok(Value::Bool(true)))]
    #[case::str_ge(BinaryOp::Ge, Value::from("b"), Value::from("a"), Ok(Value::Bool(true)))]
    #[case::eq_mixed(BinaryOp::Eq, Value::Int(1), Value::Float(1.0), Ok(Value::Bool(false)))]
    #[case::bad_types(
        BinaryOp::Sub,
        Value::from("a"),
        Value::Int(1),
        Err(EvalError::InvalidOperands { op: "-".into(), operands: vec!["str", "int"] })
    )]
    fn test_binary(#[case] op: BinaryOp, #[case] lhs: Value, #[case] rhs: Value, #[case] expected: Result<Value, EvalError>) {
        assert_eq!(binary(op, &lhs, &rhs), expected);
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Neg, &Value::Int(3)), Ok(Value::Int(-3)));
        assert_eq!(unary(UnaryOp::Not, &Value::Bool(false)), Ok(Value::Bool(true)));
        assert!(unary(UnaryOp::Not, &Value::Int(0)).is_err());
    }
}

//! Compile-time constant folding.

use crate::bind::BoundExpr;
use crate::eval::ops;
use crate::value::Value;

/// Folds operator trees whose operands are all constants.
///
/// Folding never changes behaviour: an expression that would fail at run
/// time (division by zero, bad operand types) is left for run time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantFolder;

impl ConstantFolder {
    pub fn new() -> Self {
        Self
    }

    pub fn fold(&self, expr: &BoundExpr) -> Option<Value> {
        match expr {
            BoundExpr::Const(value) => Some(value.clone()),
            BoundExpr::Unary(op, operand) => {
                let operand = self.fold(operand)?;
                ops::unary(*op, &operand).ok()
            }
            BoundExpr::Binary(op, lhs, rhs) => {
                let lhs = self.fold(lhs)?;
                let rhs = self.fold(rhs)?;
                ops::binary(*op, &lhs, &rhs).ok()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    fn constant(i: i64) -> Box<BoundExpr> {
        Box::new(BoundExpr::Const(Value::Int(i)))
    }

    #[test]
    fn test_fold_nested() {
        let expr = BoundExpr::Binary(
            BinaryOp::Mul,
            Box::new(BoundExpr::Binary(BinaryOp::Add, constant(1), constant(2))),
            constant(4),
        );
        assert_eq!(ConstantFolder::new().fold(&expr), Some(Value::Int(12)));
    }

    #[test]
    fn test_failing_expression_is_not_folded() {
        let expr = BoundExpr::Binary(BinaryOp::Div, constant(1), constant(0));
        assert_eq!(ConstantFolder::new().fold(&expr), None);
    }
}

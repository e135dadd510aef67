//! Tree-walking evaluator: the interpreted tier.

pub mod call_stack;
pub mod error;
pub(crate) mod frame;
pub(crate) mod ops;

use std::sync::Arc;

use smallvec::SmallVec;

use crate::ast::{BinaryOp, Expr, Lambda};
use crate::backend::{CompileError, InnerFn};
use crate::bind::{BoundExpr, BoundLambda, bind, bind_fragment};
use crate::closure::Closure;
use crate::quote::quote;
use crate::resolve::RuntimeVariables;
use crate::value::{Function, Invoke, Value};
use call_stack::DEFAULT_MAX_CALL_DEPTH;
use error::EvalError;
use frame::Frame;

#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    max_call_depth: u32,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(max_call_depth: u32) -> Self {
        Self { max_call_depth }
    }

    /// Binds `lambda` once and returns an implementation that interprets it
    /// on every call.
    pub fn bind_interpreted(&self, lambda: &Lambda) -> Result<InnerFn, CompileError> {
        let bound = Arc::new(bind(lambda)?);
        let evaluator = *self;
        tracing::trace!(lambda = %lambda.name, "bound interpreted implementation");
        Ok(Arc::new(move |closure: &Closure, args: &[Value]| {
            evaluator.call(&bound, closure, args)
        }))
    }

    /// Evaluates a bound lambda with `closure` as its incoming closure.
    pub fn call(&self, lambda: &BoundLambda, closure: &Closure, args: &[Value]) -> Result<Value, EvalError> {
        let _depth = call_stack::enter(self.max_call_depth)?;
        let mut frame = lambda.layout.enter(closure, args)?;
        self.eval(&lambda.body, &mut frame)
    }

    /// Evaluates a quoted fragment. Only slots already bound into the
    /// fragment are visible to it.
    pub fn eval_fragment(&self, fragment: &Expr) -> Result<Value, EvalError> {
        let bound = bind_fragment(fragment).map_err(CompileError::from)?;
        self.call(&bound, &Closure::empty(), &[])
    }

    fn eval(&self, expr: &BoundExpr, frame: &mut Frame) -> Result<Value, EvalError> {
        match expr {
            BoundExpr::Const(value) => Ok(value.clone()),
            BoundExpr::Load(var) => frame.load(*var),
            BoundExpr::Store(var, value) => {
                let value = self.eval(value, frame)?;
                frame.store(*var, value.clone())?;
                Ok(value)
            }
            BoundExpr::Let(var, value, body) => {
                let value = self.eval(value, frame)?;
                frame.store(*var, value)?;
                self.eval(body, frame)
            }
            BoundExpr::Unary(op, operand) => {
                let value = self.eval(operand, frame)?;
                ops::unary(*op, &value)
            }
            BoundExpr::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                let short = ops::truthy(&op.to_string(), &lhs)?;
                if short == (*op == BinaryOp::Or) {
                    return Ok(Value::Bool(short));
                }
                let rhs = self.eval(rhs, frame)?;
                ops::truthy(&op.to_string(), &rhs).map(Value::Bool)
            }
            BoundExpr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                ops::binary(*op, &lhs, &rhs)
            }
            BoundExpr::If(cond, then, otherwise) => {
                let cond = self.eval(cond, frame)?;
                if ops::truthy("if", &cond)? {
                    self.eval(then, frame)
                } else {
                    self.eval(otherwise, frame)
                }
            }
            BoundExpr::While(cond, body) => {
                loop {
                    let value = self.eval(cond, frame)?;
                    if !ops::truthy("while", &value)? {
                        break;
                    }
                    self.eval(body, frame)?;
                }
                Ok(Value::Unit)
            }
            BoundExpr::Block(exprs) => {
                let mut last = Value::Unit;
                for expr in exprs {
                    last = self.eval(expr, frame)?;
                }
                Ok(last)
            }
            BoundExpr::Call(callee, args) => {
                let callee = self.eval(callee, frame)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, frame))
                    .collect::<Result<SmallVec<[Value; 4]>, _>>()?;
                match callee {
                    Value::Function(function) => function.call(&args),
                    other => Err(EvalError::NotCallable(other.type_name())),
                }
            }
            BoundExpr::Lambda(lambda) => Ok(Value::Function(Function::new(InterpretedFunction {
                evaluator: *self,
                lambda: Arc::clone(lambda),
                env: frame.env.clone(),
            }))),
            BoundExpr::Quote { fragment, layout } => match layout {
                Some(layout) => Ok(Value::Quoted(Arc::new(quote(fragment, layout, &frame.env)?))),
                None => Ok(Value::Quoted(Arc::clone(fragment))),
            },
            BoundExpr::Variables(indexes) => Ok(Value::Variables(RuntimeVariables::new(
                frame.env.clone(),
                Arc::clone(indexes),
            ))),
            BoundExpr::Slot(slot) => Ok(slot.load()?),
            BoundExpr::SlotStore(slot, value) => {
                let value = self.eval(value, frame)?;
                slot.store(value.clone())?;
                Ok(value)
            }
        }
    }
}

/// A lambda value created while interpreting.
struct InterpretedFunction {
    evaluator: Evaluator,
    lambda: Arc<BoundLambda>,
    env: Closure,
}

impl Invoke for InterpretedFunction {
    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.evaluator.call(&self.lambda, &self.env, args)
    }

    fn arity(&self) -> Option<usize> {
        Some(self.lambda.arity())
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::ast::HoistedLocals;
    use crate::types::SemType;

    #[fixture]
    fn evaluator() -> Evaluator {
        Evaluator::new()
    }

    fn run(evaluator: &Evaluator, lambda: &Lambda, closure: &Closure, args: &[Value]) -> Result<Value, EvalError> {
        let bound = bind(lambda).map_err(CompileError::from)?;
        evaluator.call(&bound, closure, args)
    }

    #[rstest]
    #[case::arithmetic(Expr::add(Expr::int(1), Expr::mul(Expr::int(2), Expr::int(3))), Ok(Value::Int(7)))]
    #[case::if_(Expr::if_(Expr::lt(Expr::int(1), Expr::int(2)), Expr::str("yes"), Expr::str("no")), Ok(Value::from("yes")))]
    #[case::short_circuit(
        Expr::binary(BinaryOp::Or, Expr::bool(true), Expr::binary(BinaryOp::Div, Expr::int(1), Expr::int(0))),
        Ok(Value::Bool(true))
    )]
    #[case::not_callable(Expr::call(Expr::int(1), []), Err(EvalError::NotCallable("int")))]
    #[case::zero_division(Expr::binary(BinaryOp::Div, Expr::int(1), Expr::int(0)), Err(EvalError::ZeroDivision))]
    fn test_eval(evaluator: Evaluator, #[case] body: Expr, #[case] expected: Result<Value, EvalError>) {
        let lambda = Lambda::builder("f").body(body).build();
        assert_eq!(run(&evaluator, &lambda, &Closure::empty(), &[]), expected);
    }

    #[rstest]
    fn test_while_loop(evaluator: Evaluator) {
        // let i = 0 in let sum = 0 in { while i < n { sum = sum + i; i = i + 1 }; sum }
        let body = Expr::let_(
            "i",
            Expr::int(0),
            Expr::let_(
                "sum",
                Expr::int(0),
                Expr::block([
                    Expr::while_(
                        Expr::lt(Expr::var("i"), Expr::var("n")),
                        Expr::block([
                            Expr::assign("sum", Expr::add(Expr::var("sum"), Expr::var("i"))),
                            Expr::assign("i", Expr::add(Expr::var("i"), Expr::int(1))),
                        ]),
                    ),
                    Expr::var("sum"),
                ]),
            ),
        );
        let lambda = Lambda::builder("sum").param("n", SemType::Int).body(body).build();
        assert_eq!(run(&evaluator, &lambda, &Closure::empty(), &[Value::Int(5)]), Ok(Value::Int(10)));
    }

    #[rstest]
    fn test_call_with_many_arguments(evaluator: Evaluator) {
        let names = ["a", "b", "c", "d", "e", "f"];
        let sum = names
            .iter()
            .fold(Lambda::builder("sum6"), |builder, name| builder.param(name, SemType::Int))
            .body(names.iter().map(|name| Expr::var(name)).reduce(Expr::add).unwrap())
            .build();
        let body = Expr::let_(
            "sum6",
            Expr::lambda(sum),
            Expr::call(Expr::var("sum6"), (1..=6).map(Expr::int)),
        );
        let lambda = Lambda::builder("caller").body(body).build();
        assert_eq!(run(&evaluator, &lambda, &Closure::empty(), &[]), Ok(Value::Int(21)));
    }

    #[rstest]
    fn test_counter_closure(evaluator: Evaluator) {
        // let count = 0 in { let inc = lambda() { count = count + 1 } in { inc(); inc(); count } }
        let inc = Lambda::builder("inc")
            .body(Expr::assign("count", Expr::add(Expr::var("count"), Expr::int(1))))
            .build();
        let body = Expr::let_(
            "count",
            Expr::int(0),
            Expr::let_(
                "inc",
                Expr::lambda(inc),
                Expr::block([
                    Expr::call(Expr::var("inc"), []),
                    Expr::call(Expr::var("inc"), []),
                    Expr::var("count"),
                ]),
            ),
        );
        let lambda = Lambda::builder("counter").body(body).build();
        assert_eq!(run(&evaluator, &lambda, &Closure::empty(), &[]), Ok(Value::Int(2)));
    }

    #[rstest]
    fn test_incoming_closure(evaluator: Evaluator) {
        let hoisted = Arc::new(HoistedLocals::root([("total", SemType::Int)]));
        let closure = hoisted.closure_shape().instantiate(vec![Value::Int(40)]).unwrap();
        let lambda = Lambda::builder("add_to_total")
            .hoisted(hoisted)
            .param("x", SemType::Int)
            .body(Expr::assign("total", Expr::add(Expr::var("total"), Expr::var("x"))))
            .build();
        assert_eq!(run(&evaluator, &lambda, &closure, &[Value::Int(2)]), Ok(Value::Int(42)));
        assert_eq!(closure.get(0), Ok(Value::Int(42)));
    }

    #[test]
    fn test_recursion_limit() {
        let evaluator = Evaluator::with_max_call_depth(16);
        // let f = () in { f = lambda() { f() }; f() }
        let f = Lambda::builder("f").body(Expr::call(Expr::var("f"), [])).build();
        let body = Expr::let_(
            "f",
            Expr::unit(),
            Expr::block([Expr::assign("f", Expr::lambda(f)), Expr::call(Expr::var("f"), [])]),
        );
        let lambda = Lambda::builder("loop").body(body).build();
        assert_eq!(
            run(&evaluator, &lambda, &Closure::empty(), &[]),
            Err(EvalError::RecursionError(16))
        );
    }

    #[rstest]
    fn test_arguments_are_checked(evaluator: Evaluator) {
        let lambda = Lambda::builder("id").param("x", SemType::Int).body(Expr::var("x")).build();
        assert_eq!(
            run(&evaluator, &lambda, &Closure::empty(), &[]),
            Err(EvalError::ArityMismatch { expected: 1, got: 0 })
        );
        assert_eq!(
            run(&evaluator, &lambda, &Closure::empty(), &[Value::Bool(true)]),
            Err(EvalError::TypeMismatch {
                position: 0,
                expected: SemType::Int,
                found: "bool",
            })
        );
    }
}

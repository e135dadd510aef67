//! Transforms bound lambdas into trees of closures.

use std::sync::Arc;

use smallvec::SmallVec;

use super::compiled::{CompiledExpr, CompiledFunction, CompiledLambda};
use super::constant_fold::ConstantFolder;
use crate::ast::{BinaryOp, Lambda};
use crate::backend::{CompileError, InnerFn};
use crate::bind::{BoundExpr, BoundLambda, VarRef, bind};
use crate::closure::Closure;
use crate::eval::call_stack::DEFAULT_MAX_CALL_DEPTH;
use crate::eval::error::EvalError;
use crate::eval::ops;
use crate::quote::quote;
use crate::resolve::RuntimeVariables;
use crate::value::{Function, Value};

/// Compiler for the compiled tier.
///
/// Every bound expression becomes a boxed closure; dispatch on the
/// expression kind happens once, at compile time, instead of on every
/// evaluation.
#[derive(Debug, Clone)]
pub struct Compiler {
    constant_folder: ConstantFolder,
    max_call_depth: u32,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_max_call_depth(DEFAULT_MAX_CALL_DEPTH)
    }

    pub fn with_max_call_depth(max_call_depth: u32) -> Self {
        Self {
            constant_folder: ConstantFolder::new(),
            max_call_depth,
        }
    }

    /// Binds and compiles `lambda`.
    pub fn compile(&self, lambda: &Lambda) -> Result<InnerFn, CompileError> {
        let bound = bind(lambda)?;
        let compiled = Arc::new(self.compile_lambda(&bound));
        tracing::debug!(lambda = %lambda.name, arity = compiled.arity(), "compiled lambda");
        Ok(Arc::new(move |closure: &Closure, args: &[Value]| compiled.call(closure, args)))
    }

    pub fn compile_lambda(&self, lambda: &BoundLambda) -> CompiledLambda {
        CompiledLambda {
            name: lambda.name.clone(),
            layout: lambda.layout.clone(),
            body: self.compile_expr(&lambda.body),
            max_call_depth: self.max_call_depth,
        }
    }

    fn compile_expr(&self, expr: &BoundExpr) -> CompiledExpr {
        if let Some(value) = self.constant_folder.fold(expr) {
            return Box::new(move |_frame| Ok(value.clone()));
        }

        match expr {
            BoundExpr::Const(value) => {
                let value = value.clone();
                Box::new(move |_frame| Ok(value.clone()))
            }
            BoundExpr::Load(VarRef::Local(slot)) => {
                let slot = *slot as usize;
                Box::new(move |frame| Ok(frame.locals[slot].clone()))
            }
            BoundExpr::Load(var) => {
                let var = *var;
                Box::new(move |frame| frame.load(var))
            }
            BoundExpr::Store(var, value) => {
                let var = *var;
                let value = self.compile_expr(value);
                Box::new(move |frame| {
                    let value = value(frame)?;
                    frame.store(var, value.clone())?;
                    Ok(value)
                })
            }
            BoundExpr::Let(var, value, body) => {
                let var = *var;
                let value = self.compile_expr(value);
                let body = self.compile_expr(body);
                Box::new(move |frame| {
                    let value = value(frame)?;
                    frame.store(var, value)?;
                    body(frame)
                })
            }
            BoundExpr::Unary(op, operand) => {
                let op = *op;
                let operand = self.compile_expr(operand);
                Box::new(move |frame| ops::unary(op, &operand(frame)?))
            }
            BoundExpr::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
                let op = *op;
                let name = op.to_string();
                let lhs = self.compile_expr(lhs);
                let rhs = self.compile_expr(rhs);
                Box::new(move |frame| {
                    let short = ops::truthy(&name, &lhs(frame)?)?;
                    if short == (op == BinaryOp::Or) {
                        return Ok(Value::Bool(short));
                    }
                    ops::truthy(&name, &rhs(frame)?).map(Value::Bool)
                })
            }
            BoundExpr::Binary(op, lhs, rhs) => {
                let op = *op;
                let lhs = self.compile_expr(lhs);
                let rhs = self.compile_expr(rhs);
                Box::new(move |frame| {
                    let lhs = lhs(frame)?;
                    let rhs = rhs(frame)?;
                    ops::binary(op, &lhs, &rhs)
                })
            }
            BoundExpr::If(cond, then, otherwise) => {
                let cond = self.compile_expr(cond);
                let then = self.compile_expr(then);
                let otherwise = self.compile_expr(otherwise);
                Box::new(move |frame| {
                    if ops::truthy("if", &cond(frame)?)? {
                        then(frame)
                    } else {
                        otherwise(frame)
                    }
                })
            }
            BoundExpr::While(cond, body) => {
                let cond = self.compile_expr(cond);
                let body = self.compile_expr(body);
                Box::new(move |frame| {
                    while ops::truthy("while", &cond(frame)?)? {
                        body(frame)?;
                    }
                    Ok(Value::Unit)
                })
            }
            BoundExpr::Block(exprs) => {
                let exprs = exprs.iter().map(|e| self.compile_expr(e)).collect::<Vec<_>>();
                Box::new(move |frame| {
                    let mut last = Value::Unit;
                    for expr in &exprs {
                        last = expr(frame)?;
                    }
                    Ok(last)
                })
            }
            BoundExpr::Call(callee, args) => {
                let callee = self.compile_expr(callee);
                let args = args.iter().map(|e| self.compile_expr(e)).collect::<Vec<_>>();
                Box::new(move |frame| {
                    let callee = callee(frame)?;
                    let args = args
                        .iter()
                        .map(|arg| arg(frame))
                        .collect::<Result<SmallVec<[Value; 4]>, _>>()?;
                    match callee {
                        Value::Function(function) => function.call(&args),
                        other => Err(EvalError::NotCallable(other.type_name())),
                    }
                })
            }
            BoundExpr::Lambda(lambda) => {
                let compiled = Arc::new(self.compile_lambda(lambda));
                Box::new(move |frame| {
                    Ok(Value::Function(Function::new(CompiledFunction {
                        lambda: Arc::clone(&compiled),
                        env: frame.env.clone(),
                    })))
                })
            }
            BoundExpr::Quote { fragment, layout } => {
                let fragment = Arc::clone(fragment);
                match layout.clone() {
                    Some(layout) => Box::new(move |frame| {
                        Ok(Value::Quoted(Arc::new(quote(&fragment, &layout, &frame.env)?)))
                    }),
                    None => Box::new(move |_frame| Ok(Value::Quoted(Arc::clone(&fragment)))),
                }
            }
            BoundExpr::Variables(indexes) => {
                let indexes = Arc::clone(indexes);
                Box::new(move |frame| {
                    Ok(Value::Variables(RuntimeVariables::new(
                        frame.env.clone(),
                        Arc::clone(&indexes),
                    )))
                })
            }
            BoundExpr::Slot(slot) => {
                let slot = slot.clone();
                Box::new(move |_frame| Ok(slot.load()?))
            }
            BoundExpr::SlotStore(slot, value) => {
                let slot = slot.clone();
                let value = self.compile_expr(value);
                Box::new(move |frame| {
                    let value = value(frame)?;
                    slot.store(value.clone())?;
                    Ok(value)
                })
            }
        }
    }
}

//! Quoting: materializing a fragment's lexical environment.
//!
//! A quoted fragment leaves the lambda it was written in as data. Before it
//! does, every free variable it mentions is resolved against the enclosing
//! closure chain and replaced by the closure slot holding it, so evaluating
//! the fragment later reads and writes the same storage the lambda does.

use std::sync::Arc;

use crate::ast::{BoundSlot, Expr, HoistedLocals, Lambda, Symbol};
use crate::closure::{Closure, ClosureError};
use crate::resolve::resolve;

/// Rewrites free variables of `expr` that `hoisted` knows about into bound
/// closure slots. Names bound inside the fragment by `let` or a lambda
/// parameter shadow hoisted ones; unknown names are left free.
pub fn quote(expr: &Expr, hoisted: &HoistedLocals, closure: &Closure) -> Result<Expr, ClosureError> {
    let mut quoter = Quoter {
        hoisted,
        closure,
        shadowed: Vec::new(),
    };
    quoter.rewrite(expr)
}

struct Quoter<'a> {
    hoisted: &'a HoistedLocals,
    closure: &'a Closure,
    shadowed: Vec<Symbol>,
}

impl Quoter<'_> {
    fn bound(&self, name: &Symbol) -> Result<Option<BoundSlot>, ClosureError> {
        if self.shadowed.contains(name) {
            return Ok(None);
        }
        let Some(index) = self.hoisted.resolve(name) else {
            return Ok(None);
        };
        let (closure, slot) = resolve(self.closure, index)?;
        BoundSlot::new(closure, slot).map(Some)
    }

    fn boxed(&mut self, expr: &Expr) -> Result<Box<Expr>, ClosureError> {
        self.rewrite(expr).map(Box::new)
    }

    fn rewrite(&mut self, expr: &Expr) -> Result<Expr, ClosureError> {
        Ok(match expr {
            Expr::Literal(_) | Expr::Constant(_) | Expr::Bound(_) | Expr::Variables(_) => expr.clone(),
            Expr::Var(name) => match self.bound(name)? {
                Some(slot) => Expr::Bound(slot),
                None => expr.clone(),
            },
            Expr::Assign(name, value) => {
                let value = self.boxed(value)?;
                match self.bound(name)? {
                    Some(slot) => Expr::BoundAssign(slot, value),
                    None => Expr::Assign(name.clone(), value),
                }
            }
            Expr::Let(name, value, body) => {
                let value = self.boxed(value)?;
                self.shadowed.push(name.clone());
                let body = self.boxed(body);
                self.shadowed.pop();
                Expr::Let(name.clone(), value, body?)
            }
            Expr::Unary(op, operand) => Expr::Unary(*op, self.boxed(operand)?),
            Expr::Binary(op, lhs, rhs) => Expr::Binary(*op, self.boxed(lhs)?, self.boxed(rhs)?),
            Expr::If(cond, then, otherwise) => {
                Expr::If(self.boxed(cond)?, self.boxed(then)?, self.boxed(otherwise)?)
            }
            Expr::While(cond, body) => Expr::While(self.boxed(cond)?, self.boxed(body)?),
            Expr::Block(exprs) => Expr::Block(
                exprs
                    .iter()
                    .map(|e| self.rewrite(e))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Call(callee, args) => Expr::Call(
                self.boxed(callee)?,
                args.iter()
                    .map(|e| self.rewrite(e))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Lambda(lambda) => {
                let mark = self.shadowed.len();
                self.shadowed.extend(lambda.params.iter().map(|p| p.name.clone()));
                let body = self.rewrite(&lambda.body);
                self.shadowed.truncate(mark);
                Expr::Lambda(Arc::new(Lambda {
                    body: body?,
                    ..Lambda::clone(lambda)
                }))
            }
            Expr::Quote(fragment) => Expr::Quote(Arc::new(self.rewrite(fragment)?)),
            Expr::BoundAssign(slot, value) => Expr::BoundAssign(slot.clone(), self.boxed(value)?),
        })
    }
}

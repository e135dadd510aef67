//! Name binding.
//!
//! Turns a [`Lambda`] into a [`BoundLambda`] whose variable references are
//! frame slots ([`VarRef::Local`]) or closure slots ([`VarRef::Hoisted`]).
//! Both execution tiers run the bound form.

mod capture;

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use capture::{CaptureScan, DeclId};

use crate::ast::{BinaryOp, BoundSlot, Expr, HoistedLocals, Lambda, Symbol, UnaryOp};
use crate::closure::ClosureShape;
use crate::resolve::VarIndex;
use crate::types::SemType;
use crate::value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("Undefined variable \"{0}\"")]
    Unbound(Symbol),
    #[error("Cannot assign to undefined variable \"{0}\"")]
    AssignUnbound(Symbol),
    #[error("Scope needs {0} slots, at most 65536 are addressable")]
    TooManyVariables(usize),
    #[error("Variable \"{0}\" is nested too deeply to address")]
    TooDeep(Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRef {
    Local(u16),
    /// Relative to the closure of the frame doing the access.
    Hoisted(VarIndex),
}

#[derive(Debug, Clone)]
pub enum BoundExpr {
    Const(Value),
    Load(VarRef),
    Store(VarRef, Box<BoundExpr>),
    Let(VarRef, Box<BoundExpr>, Box<BoundExpr>),
    Unary(UnaryOp, Box<BoundExpr>),
    Binary(BinaryOp, Box<BoundExpr>, Box<BoundExpr>),
    If(Box<BoundExpr>, Box<BoundExpr>, Box<BoundExpr>),
    While(Box<BoundExpr>, Box<BoundExpr>),
    Block(Vec<BoundExpr>),
    Call(Box<BoundExpr>, Vec<BoundExpr>),
    Lambda(Arc<BoundLambda>),
    Quote {
        fragment: Arc<Expr>,
        layout: Option<Arc<HoistedLocals>>,
    },
    Variables(Arc<[VarIndex]>),
    Slot(BoundSlot),
    SlotStore(BoundSlot, Box<BoundExpr>),
}

/// How a call sets up its frame.
#[derive(Debug, Clone)]
pub struct FrameLayout {
    pub params: Vec<SemType>,
    /// Number of frame slots; parameters occupy the first `params.len()`.
    pub frame_size: usize,
    /// Layout of the closure created on entry, when any declaration is hoisted.
    pub scope: Option<Arc<HoistedLocals>>,
    pub closure_shape: Option<ClosureShape>,
    /// `(parameter, closure slot)` pairs copied into the closure on entry.
    pub hoisted_params: Vec<(usize, usize)>,
}

impl FrameLayout {
    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone)]
pub struct BoundLambda {
    pub name: Symbol,
    pub layout: FrameLayout,
    pub body: BoundExpr,
}

impl BoundLambda {
    #[inline]
    pub fn arity(&self) -> usize {
        self.layout.arity()
    }
}

#[derive(Debug, Clone, Copy)]
enum Loc {
    Local(u16),
    Hoisted(u16),
}

struct Frame {
    incoming: Option<Arc<HoistedLocals>>,
    scope: Option<Arc<HoistedLocals>>,
    slots: FxHashMap<DeclId, u16>,
    next_local: u16,
}

impl Frame {
    /// Layout of the closure code in this frame runs against.
    fn env(&self) -> Option<Arc<HoistedLocals>> {
        self.scope.clone().or_else(|| self.incoming.clone())
    }
}

struct Binder {
    scan: CaptureScan,
    frames: Vec<Frame>,
    scope: Vec<(Symbol, usize, Loc)>,
    next_decl: DeclId,
    next_frame: usize,
}

/// Binds a lambda invoked with a closure laid out as `lambda.hoisted`.
pub fn bind(lambda: &Lambda) -> Result<BoundLambda, BindError> {
    let scan = CaptureScan::run(lambda);
    let mut binder = Binder {
        scan,
        frames: Vec::new(),
        scope: Vec::new(),
        next_decl: 0,
        next_frame: 0,
    };
    binder.bind_lambda(lambda, lambda.hoisted.clone())
}

/// Binds a free-standing fragment as the body of a nullary lambda.
pub fn bind_fragment(fragment: &Expr) -> Result<BoundLambda, BindError> {
    let lambda = Lambda::builder("fragment").body(fragment.clone()).build();
    bind(&lambda)
}

impl Binder {
    fn bind_lambda(
        &mut self,
        lambda: &Lambda,
        incoming: Option<Arc<HoistedLocals>>,
    ) -> Result<BoundLambda, BindError> {
        let frame_id = self.next_frame;
        self.next_frame += 1;

        let hoisted = self
            .scan
            .hoisted_in(frame_id)
            .map(|(id, decl)| (id, decl.name.clone(), decl.ty.clone()))
            .collect::<Vec<_>>();
        let scope = (!hoisted.is_empty()).then(|| {
            Arc::new(HoistedLocals::new(
                incoming.clone(),
                hoisted.iter().map(|(_, name, ty)| (name.clone(), ty.clone())),
            ))
        });
        let offset = scope.as_ref().map_or(0, |s| s.offset());
        let slots = hoisted
            .iter()
            .enumerate()
            .map(|(position, (id, _, _))| {
                u16::try_from(position + offset)
                    .map(|slot| (*id, slot))
                    .map_err(|_| BindError::TooManyVariables(offset + hoisted.len()))
            })
            .collect::<Result<FxHashMap<_, _>, _>>()?;

        self.frames.push(Frame {
            incoming,
            scope: scope.clone(),
            slots,
            next_local: 0,
        });
        let mark = self.scope.len();

        let body = self.bind_params(lambda).and_then(|hoisted_params| {
            self.bind_expr(&lambda.body).map(|body| (hoisted_params, body))
        });
        self.scope.truncate(mark);
        let frame = self.frames.pop();
        let (hoisted_params, body) = body?;

        Ok(BoundLambda {
            name: lambda.name.clone(),
            layout: FrameLayout {
                params: lambda.params.iter().map(|p| p.ty.clone()).collect(),
                frame_size: frame.map_or(0, |f| f.next_local as usize),
                closure_shape: scope.as_ref().map(|s| s.closure_shape()),
                scope,
                hoisted_params,
            },
            body,
        })
    }

    /// Gives every parameter a frame slot and returns the
    /// `(parameter, closure slot)` pairs of the hoisted ones.
    fn bind_params(&mut self, lambda: &Lambda) -> Result<Vec<(usize, usize)>, BindError> {
        let mut hoisted_params = Vec::new();
        for (index, param) in lambda.params.iter().enumerate() {
            let local = self.alloc_local()?;
            match self.declare(&param.name) {
                Loc::Hoisted(slot) => hoisted_params.push((index, slot as usize)),
                Loc::Local(_) => debug_assert_eq!(local as usize, index),
            }
        }
        Ok(hoisted_params)
    }

    fn current(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    fn alloc_local(&mut self) -> Result<u16, BindError> {
        let frame = self.current();
        let slot = frame.next_local;
        frame.next_local = slot
            .checked_add(1)
            .ok_or(BindError::TooManyVariables(usize::from(slot) + 1))?;
        Ok(slot)
    }

    /// Declares the next declaration in pre-order. Parameters already own a
    /// frame slot, so only hoisting is decided here.
    fn declare(&mut self, name: &Symbol) -> Loc {
        let id = self.next_decl;
        self.next_decl += 1;
        let depth = self.frames.len() - 1;
        let loc = match self.current().slots.get(&id) {
            Some(slot) => Loc::Hoisted(*slot),
            None => Loc::Local(self.current().next_local.saturating_sub(1)),
        };
        self.scope.push((name.clone(), depth, loc));
        loc
    }

    fn declare_let(&mut self, name: &Symbol) -> Result<Loc, BindError> {
        let id = self.next_decl;
        if !self.current().slots.contains_key(&id) {
            self.alloc_local()?;
        }
        Ok(self.declare(name))
    }

    /// Parent links between the innermost frame's closure and the closure of
    /// frame `depth`.
    fn hops_to(&self, depth: usize) -> Option<u16> {
        let hops = self.frames[depth + 1..]
            .iter()
            .filter(|frame| frame.scope.is_some())
            .count();
        u16::try_from(hops).ok()
    }

    fn lookup(&self, name: &Symbol) -> Result<Option<VarRef>, BindError> {
        let top = self.frames.len() - 1;
        let too_deep = || BindError::TooDeep(name.clone());
        Ok(match self.scope.iter().rev().find(|(symbol, _, _)| symbol == name) {
            Some((_, depth, Loc::Local(slot))) if *depth == top => Some(VarRef::Local(*slot)),
            Some((_, _, Loc::Local(_))) => None,
            Some((_, depth, Loc::Hoisted(slot))) => {
                let hops = self.hops_to(*depth).ok_or_else(too_deep)?;
                Some(VarRef::Hoisted(VarIndex::new(hops, *slot)))
            }
            None => {
                let Some(index) = self
                    .frames
                    .first()
                    .and_then(|root| root.incoming.as_ref())
                    .and_then(|incoming| incoming.resolve(name))
                else {
                    return Ok(None);
                };
                let scoped = self.frames.iter().filter(|f| f.scope.is_some()).count();
                let index = u16::try_from(scoped)
                    .ok()
                    .and_then(|scoped| index.deeper(scoped))
                    .ok_or_else(too_deep)?;
                Some(VarRef::Hoisted(index))
            }
        })
    }

    fn bind_expr(&mut self, expr: &Expr) -> Result<BoundExpr, BindError> {
        Ok(match expr {
            Expr::Literal(literal) => BoundExpr::Const(Value::from(literal)),
            Expr::Constant(value) => BoundExpr::Const(value.clone()),
            Expr::Var(name) => {
                BoundExpr::Load(self.lookup(name)?.ok_or_else(|| BindError::Unbound(name.clone()))?)
            }
            Expr::Assign(name, value) => {
                let value = self.bind_expr(value)?;
                let target = self
                    .lookup(name)?
                    .ok_or_else(|| BindError::AssignUnbound(name.clone()))?;
                BoundExpr::Store(target, Box::new(value))
            }
            Expr::Let(name, value, body) => {
                let value = self.bind_expr(value)?;
                let mark = self.scope.len();
                let target = match self.declare_let(name)? {
                    Loc::Local(slot) => VarRef::Local(slot),
                    Loc::Hoisted(slot) => VarRef::Hoisted(VarIndex::new(0, slot)),
                };
                let body = self.bind_expr(body);
                self.scope.truncate(mark);
                BoundExpr::Let(target, Box::new(value), Box::new(body?))
            }
            Expr::Unary(op, operand) => BoundExpr::Unary(*op, Box::new(self.bind_expr(operand)?)),
            Expr::Binary(op, lhs, rhs) => BoundExpr::Binary(
                *op,
                Box::new(self.bind_expr(lhs)?),
                Box::new(self.bind_expr(rhs)?),
            ),
            Expr::If(cond, then, otherwise) => BoundExpr::If(
                Box::new(self.bind_expr(cond)?),
                Box::new(self.bind_expr(then)?),
                Box::new(self.bind_expr(otherwise)?),
            ),
            Expr::While(cond, body) => BoundExpr::While(
                Box::new(self.bind_expr(cond)?),
                Box::new(self.bind_expr(body)?),
            ),
            Expr::Block(exprs) => BoundExpr::Block(
                exprs
                    .iter()
                    .map(|e| self.bind_expr(e))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Call(callee, args) => BoundExpr::Call(
                Box::new(self.bind_expr(callee)?),
                args.iter()
                    .map(|e| self.bind_expr(e))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Lambda(lambda) => {
                let incoming = self.current().env();
                BoundExpr::Lambda(Arc::new(self.bind_lambda(lambda, incoming)?))
            }
            Expr::Quote(fragment) => BoundExpr::Quote {
                fragment: Arc::clone(fragment),
                layout: self.current().env(),
            },
            Expr::Variables(names) => BoundExpr::Variables(
                names
                    .iter()
                    .map(|name| match self.lookup(name)? {
                        Some(VarRef::Hoisted(index)) => Ok(index),
                        _ => Err(BindError::Unbound(name.clone())),
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .into(),
            ),
            Expr::Bound(slot) => BoundExpr::Slot(slot.clone()),
            Expr::BoundAssign(slot, value) => {
                BoundExpr::SlotStore(slot.clone(), Box::new(self.bind_expr(value)?))
            }
        })
    }
}

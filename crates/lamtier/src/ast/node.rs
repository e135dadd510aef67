use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use super::hoisted::HoistedLocals;
use crate::closure::{Closure, ClosureError};
use crate::types::{CallableShape, GenericParam, SemType};
use crate::value::Value;

pub type Symbol = SmolStr;
pub type Args = Vec<Expr>;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(SmolStr),
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Unit => Value::Unit,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(x) => Value::Float(*x),
            Literal::Str(s) => Value::Str(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{op}")
    }
}

/// A closure slot already resolved out of a quoted fragment.
#[derive(Clone)]
pub struct BoundSlot {
    closure: Closure,
    slot: usize,
}

impl BoundSlot {
    pub fn new(closure: Closure, slot: usize) -> Result<Self, ClosureError> {
        if slot >= closure.arity() {
            return Err(ClosureError::SlotOutOfRange {
                slot,
                arity: closure.arity(),
            });
        }
        Ok(Self { closure, slot })
    }

    #[inline]
    pub fn closure(&self) -> &Closure {
        &self.closure
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn load(&self) -> Result<Value, ClosureError> {
        self.closure.get(self.slot)
    }

    #[inline]
    pub fn store(&self, value: Value) -> Result<(), ClosureError> {
        self.closure.set(self.slot, value)
    }
}

impl PartialEq for BoundSlot {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && Closure::ptr_eq(&self.closure, &other.closure)
    }
}

impl fmt::Debug for BoundSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundSlot({:?}[{}])", self.closure, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// A host value embedded in the tree.
    Constant(Value),
    Var(Symbol),
    Assign(Symbol, Box<Expr>),
    /// `let name = value in body`
    Let(Symbol, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    While(Box<Expr>, Box<Expr>),
    Block(Vec<Expr>),
    Call(Box<Expr>, Args),
    Lambda(Arc<Lambda>),
    /// Evaluates to the fragment with its free variables bound to closure slots.
    Quote(Arc<Expr>),
    /// Evaluates to an indexed accessor over the named variables.
    Variables(Vec<Symbol>),
    Bound(BoundSlot),
    BoundAssign(BoundSlot, Box<Expr>),
}

impl Expr {
    pub fn unit() -> Self {
        Expr::Literal(Literal::Unit)
    }

    pub fn bool(b: bool) -> Self {
        Expr::Literal(Literal::Bool(b))
    }

    pub fn int(i: i64) -> Self {
        Expr::Literal(Literal::Int(i))
    }

    pub fn float(x: f64) -> Self {
        Expr::Literal(Literal::Float(x))
    }

    pub fn str(s: &str) -> Self {
        Expr::Literal(Literal::Str(SmolStr::new(s)))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn var(name: &str) -> Self {
        Expr::Var(Symbol::new(name))
    }

    pub fn assign(name: &str, value: Expr) -> Self {
        Expr::Assign(Symbol::new(name), Box::new(value))
    }

    pub fn let_(name: &str, value: Expr, body: Expr) -> Self {
        Expr::Let(Symbol::new(name), Box::new(value), Box::new(body))
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Lt, lhs, rhs)
    }

    pub fn equals(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, lhs, rhs)
    }

    pub fn if_(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    pub fn while_(cond: Expr, body: Expr) -> Self {
        Expr::While(Box::new(cond), Box::new(body))
    }

    pub fn block(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Block(exprs.into_iter().collect())
    }

    pub fn call(callee: Expr, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Call(Box::new(callee), args.into_iter().collect())
    }

    pub fn lambda(lambda: Arc<Lambda>) -> Self {
        Expr::Lambda(lambda)
    }

    pub fn quote(fragment: Expr) -> Self {
        Expr::Quote(Arc::new(fragment))
    }

    pub fn variables<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Expr::Variables(names.into_iter().map(Symbol::new).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Symbol,
    pub ty: SemType,
}

/// A typed lambda: the unit handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub name: Symbol,
    pub generics: Vec<GenericParam>,
    pub params: Vec<Param>,
    pub ret: SemType,
    pub body: Expr,
    /// Layout of the closure the lambda is invoked with. Free variables of
    /// the body resolve against it.
    pub hoisted: Option<Arc<HoistedLocals>>,
}

impl Lambda {
    pub fn builder(name: &str) -> LambdaBuilder {
        LambdaBuilder {
            lambda: Lambda {
                name: Symbol::new(name),
                generics: Vec::new(),
                params: Vec::new(),
                ret: SemType::Any,
                body: Expr::unit(),
                hoisted: None,
            },
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// The callable shape this lambda implements.
    pub fn shape(&self) -> CallableShape {
        CallableShape::generic(
            self.generics.iter().cloned(),
            self.params.iter().map(|p| p.ty.clone()),
            self.ret.clone(),
        )
    }
}

pub struct LambdaBuilder {
    lambda: Lambda,
}

impl LambdaBuilder {
    pub fn generic(mut self, param: GenericParam) -> Self {
        self.lambda.generics.push(param);
        self
    }

    pub fn param(mut self, name: &str, ty: SemType) -> Self {
        self.lambda.params.push(Param {
            name: Symbol::new(name),
            ty,
        });
        self
    }

    pub fn returns(mut self, ty: SemType) -> Self {
        self.lambda.ret = ty;
        self
    }

    pub fn hoisted(mut self, hoisted: Arc<HoistedLocals>) -> Self {
        self.lambda.hoisted = Some(hoisted);
        self
    }

    pub fn body(mut self, body: Expr) -> Self {
        self.lambda.body = body;
        self
    }

    pub fn build(self) -> Arc<Lambda> {
        Arc::new(self.lambda)
    }
}

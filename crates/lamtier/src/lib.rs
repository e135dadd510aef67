//! `lamtier` runs lambda ASTs behind callables of a requested shape and moves
//! them between an interpreted and a compiled tier.
//!
//! ## Examples
//!
//! ```
//! use lamtier::{Closure, Engine, Expr, Lambda, Policy, SemType};
//!
//! // fn(i64, i64) -> i64 { a * b + 1 }
//! let lambda = Lambda::builder("mul_add")
//!     .param("a", SemType::Int)
//!     .param("b", SemType::Int)
//!     .returns(SemType::Int)
//!     .body(Expr::add(Expr::mul(Expr::var("a"), Expr::var("b")), Expr::int(1)))
//!     .build();
//!
//! let engine = Engine::default();
//! let mul_add = engine
//!     .create_typed::<fn(i64, i64) -> i64>(lambda, Policy::TieredCompilation, Closure::empty())
//!     .unwrap();
//!
//! // Interpreted for the first three calls, compiled from the fourth on.
//! for i in 0..8 {
//!     assert_eq!(mul_add.call((i, 2)).unwrap(), i * 2 + 1);
//! }
//! assert_eq!(mul_add.callable().thunk().compilations(), 1);
//! ```
mod ast;
mod backend;
mod bind;
mod closure;
mod compiler;
mod error;
mod eval;
mod factory;
mod options;
mod quote;
mod resolve;
mod shape;
mod tier;
mod typed;
mod types;
mod value;

pub use ast::{Args, BinaryOp, BoundSlot, Expr, HoistedLocals, Lambda, LambdaBuilder, Literal, Param, Symbol, UnaryOp};
pub use backend::{Backend, CompileError, DefaultBackend, InnerFn};
pub use bind::{BindError, BoundExpr, BoundLambda, FrameLayout, VarRef, bind, bind_fragment};
pub use closure::{
    Closure, ClosureError, ClosureShape, ClosureTemplate, ClosureTypeCache, PREBUILT_ARITY, TemplateOrigin,
    get_closure_shape,
};
pub use compiler::{CompiledLambda, Compiler, ConstantFolder};
pub use error::Error;
pub use eval::Evaluator;
pub use eval::call_stack::DEFAULT_MAX_CALL_DEPTH;
pub use eval::error::EvalError;
pub use factory::{Engine, is_cached, replace_implementation, shape_set};
pub use options::{ConfigError, ENV_MAX_CALL_DEPTH, ENV_POLICY, ENV_TIER_THRESHOLD, JitOptions};
pub use quote::quote;
pub use resolve::{RuntimeVariables, VarIndex, create_runtime_variable_accessor, resolve};
pub use shape::{Member, MemberKind, ShapeDef, ShapeError, ShapeRole, ShapeSet, synthesize};
pub use tier::{Callable, DEFAULT_TIER_THRESHOLD, Dispatcher, Policy, Recompile, Thunk, UnknownPolicy};
pub use typed::{Handle, IntoArgs, Marshal, Signature, TypedCallable};
pub use types::{CallableShape, Constraint, GenericParam, SemType};
pub use value::{Function, Invoke, Object, Value};

//! Compiled expression types.

use std::fmt;
use std::sync::Arc;

use crate::ast::Symbol;
use crate::bind::FrameLayout;
use crate::closure::Closure;
use crate::eval::call_stack;
use crate::eval::error::EvalError;
use crate::eval::frame::Frame;
use crate::value::{Invoke, Value};

/// A compiled expression: a closure over the frame of the running call.
pub(crate) type CompiledExpr = Box<dyn Fn(&mut Frame) -> Result<Value, EvalError> + Send + Sync>;

/// A lambda whose body has been compiled into closures.
pub struct CompiledLambda {
    pub(crate) name: Symbol,
    pub(crate) layout: FrameLayout,
    pub(crate) body: CompiledExpr,
    pub(crate) max_call_depth: u32,
}

impl CompiledLambda {
    #[inline]
    pub fn arity(&self) -> usize {
        self.layout.arity()
    }

    pub fn call(&self, closure: &Closure, args: &[Value]) -> Result<Value, EvalError> {
        let _depth = call_stack::enter(self.max_call_depth)?;
        let mut frame = self.layout.enter(closure, args)?;
        (self.body)(&mut frame)
    }
}

impl fmt::Debug for CompiledLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledLambda")
            .field("name", &self.name)
            .field("arity", &self.arity())
            .finish()
    }
}

/// A lambda value created by compiled code.
pub(crate) struct CompiledFunction {
    pub lambda: Arc<CompiledLambda>,
    pub env: Closure,
}

impl Invoke for CompiledFunction {
    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.lambda.call(&self.env, args)
    }

    fn arity(&self) -> Option<usize> {
        Some(self.lambda.arity())
    }
}

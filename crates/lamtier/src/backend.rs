//! The seam between the engine and whatever turns lambdas into code.

use std::sync::Arc;

use thiserror::Error;

use crate::ast::Lambda;
use crate::bind::BindError;
use crate::closure::Closure;
use crate::compiler::Compiler;
use crate::eval::Evaluator;
use crate::eval::error::EvalError;
use crate::options::JitOptions;
use crate::value::Value;

/// An implementation of a lambda: called with the incoming closure followed
/// by the lambda's own arguments.
pub type InnerFn = Arc<dyn Fn(&Closure, &[Value]) -> Result<Value, EvalError> + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("Compilation rejected: {0}")]
    Rejected(String),
}

pub trait Backend: Send + Sync {
    /// Produces the compiled implementation of `lambda`.
    fn compile(&self, lambda: &Lambda) -> Result<InnerFn, CompileError>;

    /// Produces an implementation that interprets `lambda`.
    fn interpret(&self, lambda: &Lambda) -> Result<InnerFn, CompileError>;
}

/// The closure compiler for the compiled tier and the evaluator for the
/// interpreted one.
#[derive(Debug, Clone, Default)]
pub struct DefaultBackend {
    evaluator: Evaluator,
    compiler: Compiler,
}

impl DefaultBackend {
    pub fn new(options: &JitOptions) -> Self {
        Self {
            evaluator: Evaluator::with_max_call_depth(options.max_call_depth),
            compiler: Compiler::with_max_call_depth(options.max_call_depth),
        }
    }
}

impl Backend for DefaultBackend {
    fn compile(&self, lambda: &Lambda) -> Result<InnerFn, CompileError> {
        self.compiler.compile(lambda)
    }

    fn interpret(&self, lambda: &Lambda) -> Result<InnerFn, CompileError> {
        self.evaluator.bind_interpreted(lambda)
    }
}

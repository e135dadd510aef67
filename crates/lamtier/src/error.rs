use thiserror::Error;

use crate::backend::CompileError;
use crate::bind::BindError;
use crate::closure::ClosureError;
use crate::eval::error::EvalError;
use crate::options::ConfigError;
use crate::shape::ShapeError;

/// Any error produced by the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Closure(#[from] ClosureError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

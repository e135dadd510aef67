use smol_str::SmolStr;
use thiserror::Error;

use crate::backend::CompileError;
use crate::closure::ClosureError;
use crate::types::SemType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Argument {position} expects {expected}, got {found}")]
    TypeMismatch {
        position: usize,
        expected: SemType,
        found: &'static str,
    },
    #[error("Return value expects {expected}, got {found}")]
    ReturnType {
        expected: SemType,
        found: &'static str,
    },
    #[error(r#"Invalid types for "{}", got {}"#, op, operands.join(", "))]
    InvalidOperands {
        op: SmolStr,
        operands: Vec<&'static str>,
    },
    #[error("Invalid number of arguments, expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("Divided by 0")]
    ZeroDivision,
    #[error("Value of type {0} is not callable")]
    NotCallable(&'static str),
    #[error("Maximum recursion depth exceeded \"{0}\"")]
    RecursionError(u32),
    #[error(transparent)]
    Closure(#[from] ClosureError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("The thunk behind this callable has been released")]
    ThunkReleased,
    #[error("{0}")]
    UserDefined(String),
}

impl EvalError {
    pub(crate) fn operands(op: impl Into<SmolStr>, operands: &[&crate::value::Value]) -> Self {
        EvalError::InvalidOperands {
            op: op.into(),
            operands: operands.iter().map(|v| v.type_name()).collect(),
        }
    }
}

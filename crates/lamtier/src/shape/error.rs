use smol_str::SmolStr;
use thiserror::Error;

use crate::types::SemType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Malformed shape {shape}: {reason}")]
    Malformed { shape: String, reason: String },
    #[error("Conflicting constraints on generic parameter \"{param}\"")]
    ConstraintConflict { param: SmolStr },
    #[error("Expected {expected} type arguments, got {got}")]
    TypeArgCount { expected: usize, got: usize },
    #[error("Type argument {arg} violates the constraints of \"{param}\"")]
    ConstraintViolation { param: SmolStr, arg: SemType },
    #[error("Generic parameter \"{0}\" cannot be inferred")]
    Unresolved(SmolStr),
    #[error("A lambda of shape {lambda} cannot implement {requested}")]
    Mismatch { lambda: String, requested: String },
    #[error("Shape set for {0} is generic and must be instantiated first")]
    Open(String),
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{compiling, interpreting, tiered};
use crate::shape::ThunkBody;

/// How a thunk turns its lambda into an implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Compile on first invocation and release the lambda.
    #[default]
    Compiling,
    /// Bind the interpreter on first invocation; never compile.
    Interpreting,
    /// Interpret first, compile once the hit count reaches the tier threshold.
    TieredCompilation,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown tiering policy \"{0}\"")]
pub struct UnknownPolicy(pub String);

impl Policy {
    pub(crate) fn body(self) -> ThunkBody {
        match self {
            Policy::Compiling => compiling::BODY,
            Policy::Interpreting => interpreting::BODY,
            Policy::TieredCompilation => tiered::BODY,
        }
    }
}

impl FromStr for Policy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compiling" | "compile" => Ok(Policy::Compiling),
            "interpreting" | "interpret" => Ok(Policy::Interpreting),
            "tiered_compilation" | "tiered" => Ok(Policy::TieredCompilation),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::Compiling => "compiling",
            Policy::Interpreting => "interpreting",
            Policy::TieredCompilation => "tiered_compilation",
        })
    }
}

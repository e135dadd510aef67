//! Descriptors of the shapes making up a shape set.

use std::fmt;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::types::{CallableShape, GenericParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeRole {
    /// Owns the lambda and the swappable implementation.
    Thunk,
    /// Binds one closure to one thunk.
    Dispatcher,
    /// The target shape with a leading closure parameter.
    Inner,
    /// Counting shim used by tiered compilation.
    Recompile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Constructor,
    Method,
    Property,
    Field,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: &'static str,
    pub kind: MemberKind,
    pub signature: CallableShape,
    /// Set once the member's body has been emitted.
    pub has_body: bool,
}

impl Member {
    pub(super) fn new(name: &'static str, kind: MemberKind, signature: CallableShape) -> Self {
        Self {
            name,
            kind,
            signature,
            has_body: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDef {
    pub name: SmolStr,
    pub role: ShapeRole,
    /// Generic parameters; the first one is always `TClosure`.
    pub generics: Vec<GenericParam>,
    pub members: Vec<Member>,
}

impl ShapeDef {
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Whether every member that should carry code does.
    pub fn is_emitted(&self) -> bool {
        self.role == ShapeRole::Inner || self.members.iter().all(|m| m.has_body)
    }
}

impl fmt::Display for ShapeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}<{}> {{ {} }}",
            self.name,
            self.generics.iter().map(|g| &g.name).join(", "),
            self.members
                .iter()
                .map(|m| format!("{}: {}", m.name, m.signature))
                .join("; ")
        )
    }
}

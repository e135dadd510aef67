//! Synthesis of the shapes that implement a callable shape.
//!
//! For every requested [`CallableShape`](crate::types::CallableShape) and
//! [`Policy`](crate::tier::Policy) a [`ShapeSet`] is built: a thunk shape that
//! owns the lambda and the current implementation, a dispatcher shape that
//! binds a closure to a thunk, the inner shape (the target with a leading
//! closure parameter) and, for tiered compilation, a counting recompile shape.

mod def;
mod error;
mod set;
mod synth;

pub use def::{Member, MemberKind, ShapeDef, ShapeRole};
pub use error::ShapeError;
pub(crate) use set::ThunkBody;
pub use set::ShapeSet;
pub use synth::synthesize;

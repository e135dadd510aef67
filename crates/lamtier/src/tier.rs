//! Thunks, dispatchers and the policies deciding how a lambda is run.
//!
//! | Policy | First call | Later |
//! |---|---|---|
//! | [`Policy::Compiling`] | compile under the thunk's lock, release the lambda | compiled |
//! | [`Policy::Interpreting`] | bind the interpreter | interpreted |
//! | [`Policy::TieredCompilation`] | interpret behind a [`Recompile`] shim | compiled from the threshold-th call on |

mod compiling;
mod dispatcher;
mod interpreting;
mod policy;
mod reentry;
mod thunk;
mod tiered;

pub use dispatcher::{Callable, Dispatcher};
pub use policy::{Policy, UnknownPolicy};
pub use thunk::Thunk;
pub use tiered::Recompile;

/// Default number of calls after which tiered compilation compiles.
pub const DEFAULT_TIER_THRESHOLD: usize = 4;

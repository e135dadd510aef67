//! Closure compiler: the compiled tier.
//!
//! Stands in for native code generation. A bound lambda is turned into a
//! tree of boxed closures once; calls then run the closures directly.

mod compile;
mod compiled;
mod constant_fold;

pub use compile::Compiler;
pub use compiled::CompiledLambda;
pub use constant_fold::ConstantFolder;

//! Interpret first, compile once a thunk is hot.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::thunk::{Thunk, placeholder};
use crate::ast::Lambda;
use crate::backend::InnerFn;
use crate::closure::Closure;
use crate::eval::error::EvalError;
use crate::shape::ThunkBody;
use crate::value::Value;

pub(super) const BODY: ThunkBody = ThunkBody {
    initial: placeholder,
    compile: arm,
};

/// Installs a [`Recompile`] shim over the interpreter.
fn arm(thunk: &Thunk) -> Result<InnerFn, EvalError> {
    if thunk.is_armed() {
        return Ok(thunk.implementation());
    }
    let Some((generation, ast)) = thunk.snapshot() else {
        return Ok(thunk.implementation());
    };
    let interpreted = thunk.interpret(&ast)?;
    let recompile = Arc::new(Recompile {
        thunk: thunk.weak(),
        generation,
        ast,
        threshold: thunk.threshold(),
        hits: AtomicUsize::new(0),
        implementation: RwLock::new(interpreted),
    });
    let shim = Arc::clone(&recompile);
    let implementation: InnerFn = Arc::new(move |closure: &Closure, args: &[Value]| shim.invoke(closure, args));
    if thunk.install_tiered(generation, recompile, InnerFn::clone(&implementation)) {
        Ok(implementation)
    } else {
        Ok(thunk.implementation())
    }
}

/// Counting shim placed in front of the interpreted implementation.
///
/// The call that takes the hit count to the threshold compiles the lambda
/// and switches both the shim and the thunk to the compiled code. That call
/// already runs compiled.
pub struct Recompile {
    thunk: Weak<Thunk>,
    generation: u64,
    ast: Arc<Lambda>,
    threshold: usize,
    hits: AtomicUsize,
    implementation: RwLock<InnerFn>,
}

impl Recompile {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Acquire)
    }

    pub fn invoke(&self, closure: &Closure, args: &[Value]) -> Result<Value, EvalError> {
        let hits = self.hits.fetch_add(1, Ordering::AcqRel) + 1;
        if hits == self.threshold
            && let Err(err) = self.promote()
        {
            // Start counting again so a later call retries.
            self.hits.store(0, Ordering::Release);
            return Err(err);
        }
        let implementation = InnerFn::clone(&self.implementation.read().unwrap_or_else(PoisonError::into_inner));
        implementation(closure, args)
    }

    fn promote(&self) -> Result<(), EvalError> {
        let thunk = self.thunk.upgrade().ok_or(EvalError::ThunkReleased)?;
        let compiled = thunk.compile_native(&self.ast)?;
        *self.implementation.write().unwrap_or_else(PoisonError::into_inner) = InnerFn::clone(&compiled);
        let installed = thunk.install(self.generation, compiled, true);
        tracing::debug!(
            prefix = %thunk.shapes().prefix(),
            hits = self.threshold,
            installed,
            "promoted to compiled tier"
        );
        Ok(())
    }
}

impl fmt::Debug for Recompile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recompile")
            .field("generation", &self.generation)
            .field("threshold", &self.threshold)
            .field("hits", &self.hits())
            .finish_non_exhaustive()
    }
}

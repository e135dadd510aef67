//! Compile once, on first invocation.

use super::thunk::{Thunk, placeholder};
use super::reentry;
use crate::backend::InnerFn;
use crate::eval::error::EvalError;
use crate::shape::ThunkBody;

pub(super) const BODY: ThunkBody = ThunkBody {
    initial: placeholder,
    compile,
};

fn compile(thunk: &Thunk) -> Result<InnerFn, EvalError> {
    if thunk.is_armed() {
        return Ok(thunk.implementation());
    }

    // Compiling the lambda ran it again on this thread; waiting for the lock
    // would never return.
    if reentry::is_compiling(thunk) {
        return match thunk.snapshot() {
            Some((_, ast)) => thunk.interpret(&ast),
            None => Ok(thunk.implementation()),
        };
    }

    let _lock = thunk.lock_compile();
    if thunk.is_armed() {
        return Ok(thunk.implementation());
    }
    let Some((generation, ast)) = thunk.snapshot() else {
        return Ok(thunk.implementation());
    };

    let _compiling = reentry::enter(thunk);
    let implementation = thunk.compile_native(&ast)?;
    thunk.install(generation, InnerFn::clone(&implementation), true);
    Ok(implementation)
}

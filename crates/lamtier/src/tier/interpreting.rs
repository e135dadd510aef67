//! Bind the interpreter on first invocation; never compile.

use super::thunk::{Thunk, placeholder};
use crate::backend::InnerFn;
use crate::eval::error::EvalError;
use crate::shape::ThunkBody;

pub(super) const BODY: ThunkBody = ThunkBody {
    initial: placeholder,
    compile: bind,
};

// Racing first calls may each bind; the last install wins.
fn bind(thunk: &Thunk) -> Result<InnerFn, EvalError> {
    if thunk.is_armed() {
        return Ok(thunk.implementation());
    }
    let Some((generation, ast)) = thunk.snapshot() else {
        return Ok(thunk.implementation());
    };
    let implementation = thunk.interpret(&ast)?;
    thunk.install(generation, InnerFn::clone(&implementation), false);
    tracing::trace!(prefix = %thunk.shapes().prefix(), "bound interpreter");
    Ok(implementation)
}

//! Call depth tracking shared by both tiers.

use std::cell::Cell;

use scopeguard::ScopeGuard;

use super::error::EvalError;

/// Default maximum call depth.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 1024;

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Records one more active call on this thread, failing past `max_depth`.
/// The depth is restored when the returned guard drops.
pub(crate) fn enter(max_depth: u32) -> Result<ScopeGuard<(), impl FnOnce(())>, EvalError> {
    let depth = DEPTH.get();
    if depth >= max_depth {
        return Err(EvalError::RecursionError(max_depth));
    }
    DEPTH.set(depth + 1);
    Ok(scopeguard::guard((), |_| DEPTH.set(DEPTH.get().saturating_sub(1))))
}

#[cfg(test)]
pub(crate) fn depth() -> u32 {
    DEPTH.get()
}

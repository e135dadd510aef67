//! Per-thread record of the thunks currently compiling.

use std::cell::RefCell;

use scopeguard::ScopeGuard;
use smallvec::SmallVec;

use super::Thunk;

thread_local! {
    static COMPILING: RefCell<SmallVec<[usize; 4]>> = RefCell::new(SmallVec::new());
}

#[inline]
fn key(thunk: &Thunk) -> usize {
    thunk as *const Thunk as usize
}

/// Whether this thread is inside the compilation of `thunk`.
pub(super) fn is_compiling(thunk: &Thunk) -> bool {
    let key = key(thunk);
    COMPILING.with_borrow(|active| active.contains(&key))
}

/// Marks `thunk` as compiling on this thread until the guard drops.
pub(super) fn enter(thunk: &Thunk) -> ScopeGuard<usize, impl FnOnce(usize)> {
    let key = key(thunk);
    COMPILING.with_borrow_mut(|active| active.push(key));
    scopeguard::guard(key, |key| {
        COMPILING.with_borrow_mut(|active| {
            if let Some(index) = active.iter().rposition(|k| *k == key) {
                active.remove(index);
            }
        })
    })
}

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use super::dispatcher::Dispatcher;
use super::tiered::Recompile;
use crate::ast::Lambda;
use crate::backend::{Backend, InnerFn};
use crate::closure::Closure;
use crate::eval::error::EvalError;
use crate::shape::{ShapeError, ShapeSet};
use crate::value::Value;

/// Owns a lambda and the implementation currently standing in for it.
///
/// The implementation starts as a placeholder that runs the policy's
/// `compile` member on first use. Every implementation installed afterwards
/// is tagged with the generation of the lambda it was derived from, so a
/// replaced lambda never gets an outdated implementation installed.
pub struct Thunk {
    shapes: Arc<ShapeSet>,
    backend: Arc<dyn Backend>,
    threshold: usize,
    ast: RwLock<Option<Arc<Lambda>>>,
    implementation: RwLock<InnerFn>,
    armed: AtomicBool,
    generation: AtomicU64,
    compile_lock: Mutex<()>,
    compilations: AtomicUsize,
    recompile: RwLock<Option<Arc<Recompile>>>,
    this: Weak<Thunk>,
}

impl Thunk {
    pub(crate) fn new(
        shapes: Arc<ShapeSet>,
        backend: Arc<dyn Backend>,
        threshold: usize,
        ast: Arc<Lambda>,
    ) -> Result<Arc<Self>, ShapeError> {
        if shapes.is_open() {
            return Err(ShapeError::Open(shapes.target().to_string()));
        }
        let initial = shapes.body().initial;
        Ok(Arc::new_cyclic(|this| Self {
            implementation: RwLock::new(initial(this)),
            shapes,
            backend,
            threshold,
            ast: RwLock::new(Some(ast)),
            armed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            compile_lock: Mutex::new(()),
            compilations: AtomicUsize::new(0),
            recompile: RwLock::new(None),
            this: Weak::clone(this),
        }))
    }

    pub fn shapes(&self) -> &Arc<ShapeSet> {
        &self.shapes
    }

    /// The current implementation.
    #[inline]
    pub fn implementation(&self) -> InnerFn {
        Arc::clone(&self.implementation.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether the placeholder has been replaced.
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// The lambda, unless compilation has released it.
    pub fn ast(&self) -> Option<Arc<Lambda>> {
        self.ast.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Bumped by every [`Thunk::replace_ast`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of successful native compilations.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Hit count of the tiering shim, if one is installed.
    pub fn hits(&self) -> Option<usize> {
        self.recompile().map(|recompile| recompile.hits())
    }

    pub fn recompile(&self) -> Option<Arc<Recompile>> {
        self.recompile.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Runs the policy's `compile` member and returns the implementation the
    /// current call should use.
    pub fn compile(&self) -> Result<InnerFn, EvalError> {
        (self.shapes.body().compile)(self)
    }

    pub fn create_dispatcher(self: &Arc<Self>, closure: Closure) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(Arc::clone(self), closure))
    }

    /// Swaps in a new lambda and re-arms the thunk.
    ///
    /// Calls already running on the previous implementation complete on it.
    pub fn replace_ast(&self, ast: Arc<Lambda>) {
        let mut implementation = self.implementation.write().unwrap_or_else(PoisonError::into_inner);
        *self.ast.write().unwrap_or_else(PoisonError::into_inner) = Some(ast);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *implementation = (self.shapes.body().initial)(&self.this);
        *self.recompile.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.armed.store(false, Ordering::Release);
        tracing::debug!(prefix = %self.shapes.prefix(), generation, "replaced lambda");
    }

    pub(super) fn weak(&self) -> Weak<Thunk> {
        Weak::clone(&self.this)
    }

    pub(super) fn lock_compile(&self) -> MutexGuard<'_, ()> {
        self.compile_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The lambda together with its generation, read consistently.
    pub(super) fn snapshot(&self) -> Option<(u64, Arc<Lambda>)> {
        let _implementation = self.implementation.read().unwrap_or_else(PoisonError::into_inner);
        let ast = self.ast.read().unwrap_or_else(PoisonError::into_inner).clone()?;
        Some((self.generation.load(Ordering::Acquire), ast))
    }

    /// Installs `implementation` if the lambda is still at `generation`.
    pub(super) fn install(&self, generation: u64, implementation: InnerFn, release_ast: bool) -> bool {
        let mut current = self.implementation.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(prefix = %self.shapes.prefix(), generation, "discarded outdated implementation");
            return false;
        }
        *current = implementation;
        if release_ast {
            *self.ast.write().unwrap_or_else(PoisonError::into_inner) = None;
        }
        self.armed.store(true, Ordering::Release);
        true
    }

    /// Installs the tiering shim along with its implementation. The first
    /// shim armed for a generation stays, so all calls share one hit count.
    pub(super) fn install_tiered(&self, generation: u64, recompile: Arc<Recompile>, implementation: InnerFn) -> bool {
        let mut current = self.implementation.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) != generation || self.is_armed() {
            return false;
        }
        *current = implementation;
        *self.recompile.write().unwrap_or_else(PoisonError::into_inner) = Some(recompile);
        self.armed.store(true, Ordering::Release);
        true
    }

    pub(super) fn compile_native(&self, ast: &Lambda) -> Result<InnerFn, EvalError> {
        let implementation = self.backend.compile(ast)?;
        let compilations = self.compilations.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(
            prefix = %self.shapes.prefix(),
            lambda = %ast.name,
            compilations,
            "compiled thunk"
        );
        Ok(implementation)
    }

    pub(super) fn interpret(&self, ast: &Lambda) -> Result<InnerFn, EvalError> {
        Ok(self.backend.interpret(ast)?)
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("prefix", self.shapes.prefix())
            .field("policy", &self.shapes.policy())
            .field("armed", &self.is_armed())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

/// The implementation every thunk starts with: compile, then forward.
pub(super) fn placeholder(this: &Weak<Thunk>) -> InnerFn {
    let this = Weak::clone(this);
    Arc::new(move |closure: &Closure, args: &[Value]| {
        let thunk = this.upgrade().ok_or(EvalError::ThunkReleased)?;
        let implementation = thunk.compile()?;
        implementation(closure, args)
    })
}

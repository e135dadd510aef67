//! Backends and lambdas shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use lamtier::{Backend, Closure, CompileError, DefaultBackend, Expr, InnerFn, Lambda, SemType, Value};

/// Wraps [`DefaultBackend`] and counts what it is asked to do.
#[derive(Default)]
pub struct CountingBackend {
    inner: DefaultBackend,
    pub compiles: AtomicUsize,
    pub interprets: AtomicUsize,
    /// Calls that ran compiled code.
    pub native_calls: Arc<AtomicUsize>,
    /// Makes every compilation fail while set.
    pub fail: AtomicBool,
    /// Slows compilation down to widen race windows.
    pub delay: Option<Duration>,
}

impl CountingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        let backend = Self::default();
        backend.fail.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn interprets(&self) -> usize {
        self.interprets.load(Ordering::SeqCst)
    }

    pub fn native_calls(&self) -> usize {
        self.native_calls.load(Ordering::SeqCst)
    }
}

impl Backend for CountingBackend {
    fn compile(&self, lambda: &Lambda) -> Result<InnerFn, CompileError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CompileError::Rejected(format!("{} refused", lambda.name)));
        }
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let compiled = self.inner.compile(lambda)?;
        let native_calls = Arc::clone(&self.native_calls);
        Ok(Arc::new(move |closure: &Closure, args: &[Value]| {
            native_calls.fetch_add(1, Ordering::SeqCst);
            compiled(closure, args)
        }))
    }

    fn interpret(&self, lambda: &Lambda) -> Result<InnerFn, CompileError> {
        self.interprets.fetch_add(1, Ordering::SeqCst);
        self.inner.interpret(lambda)
    }
}

/// `fn(int) -> int { x * x }`
pub fn square() -> Arc<Lambda> {
    Lambda::builder("square")
        .param("x", SemType::Int)
        .returns(SemType::Int)
        .body(Expr::mul(Expr::var("x"), Expr::var("x")))
        .build()
}

/// `fn(int) -> int { x + n }`
pub fn add_n(n: i64) -> Arc<Lambda> {
    Lambda::builder("add_n")
        .param("x", SemType::Int)
        .returns(SemType::Int)
        .body(Expr::add(Expr::var("x"), Expr::int(n)))
        .build()
}

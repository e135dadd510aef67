mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier, OnceLock};
use std::thread;
use std::time::Duration;

use common::{CountingBackend, add_n, square};
use lamtier::{
    Backend, Callable, Closure, CompileError, ConfigError, DefaultBackend, Engine, Error, EvalError, InnerFn, JitOptions,
    Lambda, Policy, Value, replace_implementation,
};
use rstest::rstest;

fn callable(backend: &Arc<CountingBackend>, policy: Policy, lambda: Arc<Lambda>) -> Callable {
    let engine = Engine::with_backend(Arc::clone(backend) as Arc<dyn Backend>, JitOptions::default()).unwrap();
    let shape = lambda.shape();
    engine.create_callable(lambda, &shape, policy, Closure::empty()).unwrap()
}

#[rstest]
#[case::compiling(Policy::Compiling)]
#[case::tiered(Policy::TieredCompilation)]
fn test_compiles_exactly_once_under_contention(#[case] policy: Policy) {
    let backend = CountingBackend::slow(Duration::from_millis(20));
    let callable = callable(&backend, policy, square());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles = (0..threads)
        .map(|i| {
            let callable = callable.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..16)
                    .map(|j| callable.call(&[Value::Int(i as i64 + j)]))
                    .collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();

    for (i, handle) in handles.into_iter().enumerate() {
        for (j, result) in handle.join().unwrap().into_iter().enumerate() {
            let x = (i + j) as i64;
            assert_eq!(result, Ok(Value::Int(x * x)));
        }
    }
    assert_eq!(backend.compiles(), 1);
    assert_eq!(callable.thunk().compilations(), 1);
}

#[test]
fn test_interpreting_never_compiles() {
    let backend = CountingBackend::new();
    let callable = callable(&backend, Policy::Interpreting, square());
    for i in 0..32 {
        assert_eq!(callable.call(&[Value::Int(i)]), Ok(Value::Int(i * i)));
    }
    assert_eq!(backend.compiles(), 0);
    assert_eq!(backend.interprets(), 1);
    assert!(callable.thunk().ast().is_some());
}

#[test]
fn test_tiered_switches_on_fourth_call() {
    let backend = CountingBackend::new();
    let callable = callable(&backend, Policy::TieredCompilation, square());

    for i in 1..=3 {
        assert_eq!(callable.call(&[Value::Int(i)]), Ok(Value::Int(i * i)));
        assert_eq!(backend.compiles(), 0);
        assert_eq!(backend.native_calls(), 0);
    }

    assert_eq!(callable.call(&[Value::Int(4)]), Ok(Value::Int(16)));
    assert_eq!(backend.compiles(), 1);
    assert_eq!(backend.native_calls(), 1);

    for i in 5..=10 {
        assert_eq!(callable.call(&[Value::Int(i)]), Ok(Value::Int(i * i)));
    }
    assert_eq!(backend.compiles(), 1);
    assert_eq!(backend.native_calls(), 7);
    assert_eq!(backend.interprets(), 1);
}

#[rstest]
#[case::one(1)]
#[case::ten(10)]
fn test_configured_threshold(#[case] threshold: usize) {
    let backend = CountingBackend::new();
    let engine = Engine::with_backend(
        Arc::clone(&backend) as Arc<dyn Backend>,
        JitOptions::default().with_tier_threshold(threshold),
    )
    .unwrap();
    let lambda = square();
    let shape = lambda.shape();
    let callable = engine
        .create_callable(lambda, &shape, Policy::TieredCompilation, Closure::empty())
        .unwrap();

    for _ in 1..threshold {
        callable.call(&[Value::Int(3)]).unwrap();
    }
    assert_eq!(backend.compiles(), 0);
    callable.call(&[Value::Int(3)]).unwrap();
    assert_eq!(backend.compiles(), 1);
}

#[test]
fn test_zero_threshold_is_rejected() {
    let backend = CountingBackend::new();
    let options = JitOptions::default().with_tier_threshold(0);
    assert_eq!(
        Engine::with_backend(Arc::clone(&backend) as Arc<dyn Backend>, options).map(|_| ()),
        Err(ConfigError::InvalidThreshold)
    );
    assert_eq!(Engine::new(options).map(|_| ()), Err(ConfigError::InvalidThreshold));
}

#[rstest]
#[case::compiling(Policy::Compiling, 2)]
#[case::interpreting(Policy::Interpreting, 0)]
#[case::tiered(Policy::TieredCompilation, 2)]
fn test_hot_swap_rearms(#[case] policy: Policy, #[case] expected_compiles: usize) {
    let backend = CountingBackend::new();
    let callable = callable(&backend, policy, add_n(1));

    for _ in 0..4 {
        assert_eq!(callable.call(&[Value::Int(1)]), Ok(Value::Int(2)));
    }

    replace_implementation(&callable, add_n(100)).unwrap();
    assert!(!callable.thunk().is_armed());
    assert_eq!(callable.thunk().generation(), 1);

    for _ in 0..4 {
        assert_eq!(callable.call(&[Value::Int(1)]), Ok(Value::Int(101)));
    }
    assert_eq!(backend.compiles(), expected_compiles);
}

#[test]
fn test_hot_swap_shares_thunk_across_clones() {
    let backend = CountingBackend::new();
    let callable = callable(&backend, Policy::Compiling, add_n(1));
    let other = callable.clone();
    assert_eq!(other.call(&[Value::Int(0)]), Ok(Value::Int(1)));
    replace_implementation(&callable, add_n(2)).unwrap();
    assert_eq!(other.call(&[Value::Int(0)]), Ok(Value::Int(2)));
}

#[test]
fn test_compile_failure_is_retried() {
    let backend = CountingBackend::failing();
    let callable = callable(&backend, Policy::Compiling, square());

    assert!(matches!(
        callable.call(&[Value::Int(2)]),
        Err(EvalError::Compile(CompileError::Rejected(_)))
    ));
    assert!(!callable.thunk().is_armed());
    assert!(callable.thunk().ast().is_some());

    backend.fail.store(false, Ordering::SeqCst);
    assert_eq!(callable.call(&[Value::Int(2)]), Ok(Value::Int(4)));
    assert!(callable.thunk().is_armed());
    assert_eq!(backend.compiles(), 1);
}

#[test]
fn test_tiered_failure_resets_hits() {
    let backend = CountingBackend::failing();
    let callable = callable(&backend, Policy::TieredCompilation, square());

    for _ in 0..3 {
        assert_eq!(callable.call(&[Value::Int(3)]), Ok(Value::Int(9)));
    }
    assert!(callable.call(&[Value::Int(3)]).is_err());
    assert_eq!(callable.thunk().hits(), Some(0));

    backend.fail.store(false, Ordering::SeqCst);
    for _ in 0..3 {
        assert_eq!(callable.call(&[Value::Int(3)]), Ok(Value::Int(9)));
    }
    assert_eq!(backend.compiles(), 0);
    assert_eq!(callable.call(&[Value::Int(3)]), Ok(Value::Int(9)));
    assert_eq!(backend.compiles(), 1);
    assert_eq!(backend.native_calls(), 1);
}

/// Calls the callable it compiles from inside `compile`.
#[derive(Default)]
struct ReentrantBackend {
    inner: DefaultBackend,
    callable: OnceLock<Callable>,
    nested: OnceLock<Result<Value, EvalError>>,
}

impl Backend for ReentrantBackend {
    fn compile(&self, lambda: &Lambda) -> Result<InnerFn, CompileError> {
        if let Some(callable) = self.callable.get() {
            let _ = self.nested.set(callable.call(&[Value::Int(5)]));
        }
        self.inner.compile(lambda)
    }

    fn interpret(&self, lambda: &Lambda) -> Result<InnerFn, CompileError> {
        self.inner.interpret(lambda)
    }
}

#[test]
fn test_reentrant_compile_is_interpreted() {
    let backend = Arc::new(ReentrantBackend::default());
    let engine = Engine::with_backend(Arc::clone(&backend) as Arc<dyn Backend>, JitOptions::default()).unwrap();
    let lambda = square();
    let shape = lambda.shape();
    let callable = engine
        .create_callable(lambda, &shape, Policy::Compiling, Closure::empty())
        .unwrap();
    backend.callable.set(callable.clone()).unwrap();

    assert_eq!(callable.call(&[Value::Int(2)]), Ok(Value::Int(4)));
    assert_eq!(backend.nested.get(), Some(&Ok(Value::Int(25))));
    assert!(callable.thunk().is_armed());
}

#[test]
fn test_shape_checked_before_arming() {
    let backend = CountingBackend::new();
    let callable = callable(&backend, Policy::Compiling, square());
    assert!(matches!(
        callable.call(&[Value::from("x")]),
        Err(EvalError::TypeMismatch { position: 0, .. })
    ));
    assert_eq!(backend.compiles(), 0);
}

#[test]
fn test_replace_rejects_other_shape() {
    let backend = CountingBackend::new();
    let callable = callable(&backend, Policy::Compiling, square());
    let wrong = Lambda::builder("unit").build();
    assert!(matches!(
        replace_implementation(&callable, wrong),
        Err(Error::Shape(_))
    ));
}

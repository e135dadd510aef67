//! Entry points: shape set cache and callable construction.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;

use crate::ast::Lambda;
use crate::backend::{Backend, DefaultBackend};
use crate::closure::{Closure, ClosureError};
use crate::error::Error;
use crate::options::{ConfigError, JitOptions};
use crate::shape::{ShapeError, ShapeSet, synthesize};
use crate::tier::{Callable, Policy, Thunk};
use crate::typed::{Signature, TypedCallable};
use crate::types::{CallableShape, SemType};

type ShapeKey = (CallableShape, Policy);

static SHAPE_SETS: LazyLock<DashMap<ShapeKey, Arc<ShapeSet>, FxBuildHasher>> =
    LazyLock::new(|| DashMap::with_hasher(FxBuildHasher));

/// Returns the shape set for `(shape, policy)`, synthesizing it on first
/// request. Concurrent first requests synthesize once; a failed synthesis
/// leaves nothing behind.
pub fn shape_set(shape: &CallableShape, policy: Policy) -> Result<Arc<ShapeSet>, ShapeError> {
    let key = (shape.clone(), policy);
    if let Some(set) = SHAPE_SETS.get(&key) {
        return Ok(Arc::clone(set.value()));
    }

    match SHAPE_SETS.entry(key) {
        Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
        Entry::Vacant(entry) => {
            tracing::debug!(%shape, %policy, "shape set cache miss");
            let set = Arc::new(synthesize(shape, policy)?);
            Ok(Arc::clone(entry.insert(set).value()))
        }
    }
}

pub fn is_cached(shape: &CallableShape, policy: Policy) -> bool {
    SHAPE_SETS.contains_key(&(shape.clone(), policy))
}

/// Points an existing callable at a new lambda of the same shape.
///
/// The callable goes back to its placeholder, so the new lambda is compiled
/// or interpreted again according to the callable's policy.
pub fn replace_implementation(callable: &Callable, ast: Arc<Lambda>) -> Result<(), Error> {
    check_lambda(&ast, callable.shape())?;
    check_closure(&ast, callable.closure())?;
    callable.thunk().replace_ast(ast);
    Ok(())
}

fn check_lambda(lambda: &Lambda, requested: &CallableShape) -> Result<(), ShapeError> {
    let own = lambda.shape();
    if own == *requested || (own.is_generic() && own.unify(requested).is_ok()) {
        return Ok(());
    }
    Err(ShapeError::Mismatch {
        lambda: own.to_string(),
        requested: requested.to_string(),
    })
}

fn check_closure(lambda: &Lambda, closure: &Closure) -> Result<(), ClosureError> {
    match &lambda.hoisted {
        Some(hoisted) if hoisted.arity() != closure.arity() => Err(ClosureError::Arity {
            expected: hoisted.arity(),
            got: closure.arity(),
        }),
        _ => Ok(()),
    }
}

/// Creates callables from lambdas.
///
/// ```
/// use lamtier::{Closure, Engine, Expr, Lambda, Policy, SemType, Value};
///
/// let lambda = Lambda::builder("inc")
///     .param("x", SemType::Int)
///     .returns(SemType::Int)
///     .body(Expr::add(Expr::var("x"), Expr::int(1)))
///     .build();
/// let engine = Engine::default();
/// let callable = engine
///     .create_callable(lambda.clone(), &lambda.shape(), Policy::TieredCompilation, Closure::empty())
///     .unwrap();
/// assert_eq!(callable.call(&[Value::Int(41)]), Ok(Value::Int(42)));
/// ```
#[derive(Clone)]
pub struct Engine {
    backend: Arc<dyn Backend>,
    options: JitOptions,
}

impl Default for Engine {
    fn default() -> Self {
        let options = JitOptions::default();
        Self {
            backend: Arc::new(DefaultBackend::new(&options)),
            options,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("options", &self.options).finish_non_exhaustive()
    }
}

impl Engine {
    /// Fails with [`ConfigError::InvalidThreshold`] when `options` would
    /// keep tiered callables interpreting forever.
    pub fn new(options: JitOptions) -> Result<Self, ConfigError> {
        let options = options.validate()?;
        Ok(Self {
            backend: Arc::new(DefaultBackend::new(&options)),
            options,
        })
    }

    pub fn with_backend(backend: Arc<dyn Backend>, options: JitOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            backend,
            options: options.validate()?,
        })
    }

    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    pub fn shape_set(&self, shape: &CallableShape, policy: Policy) -> Result<Arc<ShapeSet>, ShapeError> {
        shape_set(shape, policy)
    }

    /// Creates a callable of `shape` running `ast` over `closure`.
    pub fn create_callable(
        &self,
        ast: Arc<Lambda>,
        shape: &CallableShape,
        policy: Policy,
        closure: Closure,
    ) -> Result<Callable, Error> {
        if shape.is_generic() {
            return Err(ShapeError::Open(shape.to_string()).into());
        }
        check_lambda(&ast, shape)?;
        check_closure(&ast, &closure)?;
        let shapes = self.shape_set(shape, policy)?;
        self.bind(shapes, ast, closure)
    }

    /// [`Engine::create_callable`] with the configured default policy.
    pub fn create_default_callable(
        &self,
        ast: Arc<Lambda>,
        shape: &CallableShape,
        closure: Closure,
    ) -> Result<Callable, Error> {
        self.create_callable(ast, shape, self.options.default_policy, closure)
    }

    /// Creates a callable of the generic `shape` closed over `type_args`.
    pub fn create_generic_callable(
        &self,
        ast: Arc<Lambda>,
        shape: &CallableShape,
        type_args: &[SemType],
        policy: Policy,
        closure: Closure,
    ) -> Result<Callable, Error> {
        let shapes = self.shape_set(shape, policy)?.instantiate(type_args)?;
        check_lambda(&ast, shapes.target())?;
        check_closure(&ast, &closure)?;
        self.bind(shapes, ast, closure)
    }

    /// Creates a callable whose shape comes from the Rust signature `F`.
    pub fn create_typed<F: Signature>(
        &self,
        ast: Arc<Lambda>,
        policy: Policy,
        closure: Closure,
    ) -> Result<TypedCallable<F>, Error> {
        let callable = self.create_callable(ast, &F::shape(), policy, closure)?;
        Ok(TypedCallable::new(callable))
    }

    fn bind(&self, shapes: Arc<ShapeSet>, ast: Arc<Lambda>, closure: Closure) -> Result<Callable, Error> {
        let thunk = Thunk::new(shapes, Arc::clone(&self.backend), self.options.tier_threshold, ast)?;
        Ok(Callable::new(thunk.create_dispatcher(closure)))
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::ast::{Expr, HoistedLocals};
    use crate::types::GenericParam;
    use crate::value::Value;

    #[fixture]
    fn engine() -> Engine {
        Engine::default()
    }

    fn add_one() -> Arc<Lambda> {
        Lambda::builder("add_one")
            .param("x", SemType::Int)
            .returns(SemType::Int)
            .body(Expr::add(Expr::var("x"), Expr::int(1)))
            .build()
    }

    #[test]
    fn test_shape_set_is_shared() {
        let shape = CallableShape::new([SemType::Float, SemType::Float, SemType::Bool], SemType::Float);
        let a = shape_set(&shape, Policy::Interpreting).unwrap();
        let b = shape_set(&shape, Policy::Interpreting).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(is_cached(&shape, Policy::Interpreting));
        assert!(!is_cached(&shape, Policy::TieredCompilation));
    }

    #[rstest]
    fn test_shape_mismatch(engine: Engine) {
        let shape = CallableShape::new([SemType::Str], SemType::Int);
        assert!(matches!(
            engine.create_callable(add_one(), &shape, Policy::Compiling, Closure::empty()),
            Err(Error::Shape(ShapeError::Mismatch { .. }))
        ));
    }

    #[rstest]
    fn test_closure_arity_is_checked(engine: Engine) {
        let hoisted = Arc::new(HoistedLocals::root([("base", SemType::Int)]));
        let lambda = Lambda::builder("offset")
            .param("x", SemType::Int)
            .returns(SemType::Int)
            .hoisted(hoisted)
            .body(Expr::add(Expr::var("x"), Expr::var("base")))
            .build();
        let shape = lambda.shape();
        assert!(matches!(
            engine.create_callable(Arc::clone(&lambda), &shape, Policy::Compiling, Closure::empty()),
            Err(Error::Closure(ClosureError::Arity { expected: 1, got: 0 }))
        ));

        let closure = Closure::new(&[SemType::Int], vec![Value::Int(100)]).unwrap();
        let callable = engine.create_callable(lambda, &shape, Policy::Compiling, closure).unwrap();
        assert_eq!(callable.call(&[Value::Int(1)]), Ok(Value::Int(101)));
    }

    #[rstest]
    fn test_generic_lambda_unifies(engine: Engine) {
        let lambda = Lambda::builder("id")
            .generic(GenericParam::new("T"))
            .param("x", SemType::Param(0))
            .returns(SemType::Param(0))
            .body(Expr::var("x"))
            .build();
        let shape = CallableShape::new([SemType::Str], SemType::Str);
        let callable = engine
            .create_callable(lambda, &shape, Policy::Interpreting, Closure::empty())
            .unwrap();
        assert_eq!(callable.call(&[Value::from("a")]), Ok(Value::from("a")));
    }

    #[rstest]
    fn test_open_shape_needs_type_args(engine: Engine) {
        let shape = CallableShape::generic([GenericParam::new("T")], [SemType::Param(0)], SemType::Param(0));
        let lambda = Lambda::builder("id").param("x", SemType::Any).body(Expr::var("x")).build();
        assert!(matches!(
            engine.create_callable(lambda, &shape, Policy::Compiling, Closure::empty()),
            Err(Error::Shape(ShapeError::Open(_)))
        ));
    }

    #[rstest]
    fn test_replace_checks_shape(engine: Engine) {
        let callable = engine
            .create_callable(add_one(), &add_one().shape(), Policy::Compiling, Closure::empty())
            .unwrap();
        let wrong = Lambda::builder("s").returns(SemType::Str).body(Expr::str("x")).build();
        assert!(replace_implementation(&callable, wrong).is_err());
        assert_eq!(callable.call(&[Value::Int(1)]), Ok(Value::Int(2)));
    }
}

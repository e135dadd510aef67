use std::fmt;
use std::sync::Arc;

use super::thunk::Thunk;
use crate::closure::Closure;
use crate::eval::error::EvalError;
use crate::types::CallableShape;
use crate::value::{Function, Invoke, Value};

/// Binds one closure to one thunk.
///
/// Every call reads the thunk's current implementation, so replacing the
/// lambda takes effect for all dispatchers sharing the thunk.
pub struct Dispatcher {
    thunk: Arc<Thunk>,
    closure: Closure,
    target: CallableShape,
}

impl Dispatcher {
    pub(super) fn new(thunk: Arc<Thunk>, closure: Closure) -> Self {
        let target = thunk.shapes().target().clone();
        Self { thunk, closure, target }
    }

    pub fn thunk(&self) -> &Arc<Thunk> {
        &self.thunk
    }

    pub fn closure(&self) -> &Closure {
        &self.closure
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.target.check_args(args)?;
        let implementation = self.thunk.implementation();
        let value = implementation(&self.closure, args)?;
        self.target.check_return(&value)?;
        Ok(value)
    }
}

/// A ready-to-call function of a requested shape.
#[derive(Clone)]
pub struct Callable(Arc<Dispatcher>);

impl Callable {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self(dispatcher)
    }

    #[inline]
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.0.invoke(args)
    }

    pub fn shape(&self) -> &CallableShape {
        &self.0.target
    }

    pub fn thunk(&self) -> &Arc<Thunk> {
        self.0.thunk()
    }

    pub fn closure(&self) -> &Closure {
        self.0.closure()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.0
    }

    /// Wraps the callable as a first-class function value.
    pub fn to_function(&self) -> Function {
        Function::new(self.clone())
    }
}

impl Invoke for Callable {
    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.call(args)
    }

    fn arity(&self) -> Option<usize> {
        Some(self.shape().arity())
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("shape", &self.shape().to_string())
            .field("thunk", self.thunk())
            .finish()
    }
}

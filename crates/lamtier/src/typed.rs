//! Callables typed by a Rust function signature.
//!
//! `Engine::create_typed::<fn(i64, String) -> bool>(..)` derives the
//! callable shape from the signature and returns a [`TypedCallable`] that
//! converts arguments and the result.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use smallvec::{SmallVec, smallvec};
use smol_str::SmolStr;

use crate::closure::Closure;
use crate::eval::error::EvalError;
use crate::tier::Callable;
use crate::types::{CallableShape, SemType};
use crate::value::{Function, Object, Value};

/// Conversion between a Rust type and a [`Value`].
pub trait Marshal: Sized {
    fn sem_type() -> SemType;
    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Result<Self, EvalError>;
}

fn unexpected<T: Marshal>(value: &Value) -> EvalError {
    EvalError::ReturnType {
        expected: T::sem_type(),
        found: value.type_name(),
    }
}

macro_rules! impl_marshal {
    ($ty:ty, $sem:expr, $variant:ident, |$v:ident| $from:expr) => {
        impl Marshal for $ty {
            fn sem_type() -> SemType {
                $sem
            }

            fn into_value(self) -> Value {
                Value::$variant(self.into())
            }

            fn from_value(value: Value) -> Result<Self, EvalError> {
                match value {
                    Value::$variant($v) => Ok($from),
                    other => Err(unexpected::<Self>(&other)),
                }
            }
        }
    };
}

impl_marshal!(bool, SemType::Bool, Bool, |b| b);
impl_marshal!(i64, SemType::Int, Int, |i| i);
impl_marshal!(f64, SemType::Float, Float, |x| x);
impl_marshal!(String, SemType::Str, Str, |s| s.to_string());
impl_marshal!(SmolStr, SemType::Str, Str, |s| s);
impl_marshal!(Closure, SemType::Closure, Closure, |c| c);
impl_marshal!(Function, SemType::Function, Function, |f| f);

impl Marshal for () {
    fn sem_type() -> SemType {
        SemType::Unit
    }

    fn into_value(self) -> Value {
        Value::Unit
    }

    fn from_value(value: Value) -> Result<Self, EvalError> {
        match value {
            Value::Unit => Ok(()),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl Marshal for Value {
    fn sem_type() -> SemType {
        SemType::Any
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, EvalError> {
        Ok(value)
    }
}

/// A host object passed by reference.
#[derive(Debug)]
pub struct Handle<T>(pub Arc<T>);

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Any + Send + Sync> Marshal for Handle<T> {
    fn sem_type() -> SemType {
        SemType::object::<T>()
    }

    fn into_value(self) -> Value {
        Value::Object(Object::new(self.0))
    }

    fn from_value(value: Value) -> Result<Self, EvalError> {
        match &value {
            Value::Object(object) => object.downcast::<T>().map(Handle).ok_or_else(|| unexpected::<Self>(&value)),
            _ => Err(unexpected::<Self>(&value)),
        }
    }
}

/// Argument tuples of a [`Signature`].
pub trait IntoArgs {
    fn param_types() -> Vec<SemType>;
    fn into_args(self) -> SmallVec<[Value; 4]>;
}

/// A function pointer type used as a callable shape.
pub trait Signature {
    type Args: IntoArgs;
    type Output: Marshal;

    fn shape() -> CallableShape {
        CallableShape::new(<Self::Args as IntoArgs>::param_types(), <Self::Output as Marshal>::sem_type())
    }
}

macro_rules! impl_signature {
    ($($arg:ident),*) => {
        impl<$($arg: Marshal,)*> IntoArgs for ($($arg,)*) {
            fn param_types() -> Vec<SemType> {
                vec![$(<$arg as Marshal>::sem_type()),*]
            }

            #[allow(non_snake_case)]
            fn into_args(self) -> SmallVec<[Value; 4]> {
                let ($($arg,)*) = self;
                smallvec![$($arg.into_value()),*]
            }
        }

        impl<R: Marshal, $($arg: Marshal,)*> Signature for fn($($arg),*) -> R {
            type Args = ($($arg,)*);
            type Output = R;
        }
    };
}

impl_signature!();
impl_signature!(A);
impl_signature!(A, B);
impl_signature!(A, B, C);
impl_signature!(A, B, C, D);
impl_signature!(A, B, C, D, E);
impl_signature!(A, B, C, D, E, F);
impl_signature!(A, B, C, D, E, F, G);
impl_signature!(A, B, C, D, E, F, G, H);
impl_signature!(A, B, C, D, E, F, G, H, I);
impl_signature!(A, B, C, D, E, F, G, H, I, J);
impl_signature!(A, B, C, D, E, F, G, H, I, J, K);
impl_signature!(A, B, C, D, E, F, G, H, I, J, K, L);
impl_signature!(A, B, C, D, E, F, G, H, I, J, K, L, M);
impl_signature!(A, B, C, D, E, F, G, H, I, J, K, L, M, N);
impl_signature!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O);
impl_signature!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P);

/// A [`Callable`] with Rust argument and return types.
pub struct TypedCallable<F> {
    callable: Callable,
    signature: PhantomData<fn() -> F>,
}

impl<F> Clone for TypedCallable<F> {
    fn clone(&self) -> Self {
        Self {
            callable: self.callable.clone(),
            signature: PhantomData,
        }
    }
}

impl<F: Signature> TypedCallable<F> {
    pub(crate) fn new(callable: Callable) -> Self {
        Self {
            callable,
            signature: PhantomData,
        }
    }

    pub fn call(&self, args: F::Args) -> Result<F::Output, EvalError> {
        let value = self.callable.call(&args.into_args())?;
        F::Output::from_value(value)
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }
}

impl<F> std::fmt::Debug for TypedCallable<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypedCallable").field(&self.callable).finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    struct Counter;

    #[rstest]
    #[case::nullary(<fn() -> () as Signature>::shape(), CallableShape::new([], SemType::Unit))]
    #[case::mixed(
        <fn(i64, String, bool) -> f64 as Signature>::shape(),
        CallableShape::new([SemType::Int, SemType::Str, SemType::Bool], SemType::Float)
    )]
    #[case::handle(
        <fn(Handle<Counter>) -> Value as Signature>::shape(),
        CallableShape::new([SemType::object::<Counter>()], SemType::Any)
    )]
    fn test_signature_shape(#[case] actual: CallableShape, #[case] expected: CallableShape) {
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_sixteen_arguments() {
        type Wide = fn(i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64) -> i64;
        assert_eq!(<Wide as Signature>::shape().arity(), 16);
    }

    #[test]
    fn test_handle_round_trip() {
        let handle = Handle(Arc::new(Counter));
        let value = handle.clone().into_value();
        let back = Handle::<Counter>::from_value(value).unwrap();
        assert!(Arc::ptr_eq(&handle.0, &back.0));
        assert!(Handle::<String>::from_value(Value::Int(1)).is_err());
    }

    #[test]
    fn test_from_value_mismatch() {
        assert_eq!(
            i64::from_value(Value::Bool(true)),
            Err(EvalError::ReturnType {
                expected: SemType::Int,
                found: "bool"
            })
        );
    }
}

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::ast::Expr;
use crate::closure::Closure;
use crate::eval::error::EvalError;
use crate::resolve::RuntimeVariables;
use crate::types::SemType;

/// A value flowing through a lambda at run time.
///
/// Scalars compare by value. Objects, closures, functions and quoted
/// fragments compare by reference identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(SmolStr),
    Object(Object),
    Closure(Closure),
    Function(Function),
    Quoted(Arc<Expr>),
    Variables(RuntimeVariables),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Object(_) => "object",
            Value::Closure(_) => "closure",
            Value::Function(_) => "function",
            Value::Quoted(_) => "quoted",
            Value::Variables(_) => "variables",
        }
    }

    /// The most specific semantic type describing this value.
    pub fn sem_type(&self) -> SemType {
        match self {
            Value::Unit => SemType::Unit,
            Value::Bool(_) => SemType::Bool,
            Value::Int(_) => SemType::Int,
            Value::Float(_) => SemType::Float,
            Value::Str(_) => SemType::Str,
            Value::Object(obj) => SemType::Object(obj.type_name.clone()),
            Value::Closure(_) => SemType::Closure,
            Value::Function(_) => SemType::Function,
            Value::Quoted(_) => SemType::Quoted,
            Value::Variables(_) => SemType::Variables,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_closure(&self) -> Option<&Closure> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    #[inline]
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Closure(a), Value::Closure(b)) => Closure::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Quoted(a), Value::Quoted(b)) => Arc::ptr_eq(a, b),
            (Value::Variables(a), Value::Variables(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(obj) => write!(f, "Object({})", obj.type_name),
            Value::Closure(c) => write!(f, "{c:?}"),
            Value::Function(func) => write!(f, "{func:?}"),
            Value::Quoted(expr) => write!(f, "Quoted({expr:?})"),
            Value::Variables(vars) => write!(f, "{vars:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(obj) => write!(f, "<{}>", obj.type_name),
            Value::Closure(c) => write!(f, "<closure/{}>", c.arity()),
            Value::Function(_) => write!(f, "<function>"),
            Value::Quoted(_) => write!(f, "<quoted>"),
            Value::Variables(vars) => write!(f, "<variables/{}>", vars.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(SmolStr::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(SmolStr::from(s))
    }
}

impl From<Closure> for Value {
    fn from(c: Closure) -> Self {
        Value::Closure(c)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

/// A host object carried by reference.
#[derive(Clone)]
pub struct Object {
    type_name: SmolStr,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Object {
    pub fn new<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            type_name: SmolStr::new_static(std::any::type_name::<T>()),
            inner: value,
        }
    }

    pub fn type_name(&self) -> &SmolStr {
        &self.type_name
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Anything that can be called with a slice of values.
pub trait Invoke: Send + Sync {
    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError>;

    /// Number of arguments expected, if fixed.
    fn arity(&self) -> Option<usize> {
        None
    }
}

/// A first-class function value.
#[derive(Clone)]
pub struct Function(Arc<dyn Invoke>);

impl Function {
    pub fn new<F: Invoke + 'static>(f: F) -> Self {
        Self(Arc::new(f))
    }

    /// Wraps a host function. Arity is checked before `f` runs.
    pub fn native<F>(arity: usize, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self::new(NativeFunction { arity, f: Box::new(f) })
    }

    #[inline]
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.0.invoke(args)
    }

    pub fn arity(&self) -> Option<usize> {
        self.0.arity()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arity() {
            Some(n) => write!(f, "Function/{n}"),
            None => write!(f, "Function"),
        }
    }
}

type NativeFn = Box<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

struct NativeFunction {
    arity: usize,
    f: NativeFn,
}

impl Invoke for NativeFunction {
    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        if args.len() != self.arity {
            return Err(EvalError::ArityMismatch {
                expected: self.arity,
                got: args.len(),
            });
        }
        (self.f)(args)
    }

    fn arity(&self) -> Option<usize> {
        Some(self.arity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_equality() {
        assert_eq!(Value::from(1i64), Value::Int(1));
        assert_ne!(Value::from(1i64), Value::Float(1.0));
        assert_eq!(Value::from("a"), Value::Str("a".into()));
    }

    #[test]
    fn test_object_identity() {
        let shared = Arc::new(String::from("payload"));
        let a = Object::new(Arc::clone(&shared));
        let b = Object::new(Arc::clone(&shared));
        let c = Object::new(Arc::new(String::from("payload")));

        assert_eq!(Value::Object(a.clone()), Value::Object(b));
        assert_ne!(Value::Object(a.clone()), Value::Object(c));
        assert!(Arc::ptr_eq(&a.downcast::<String>().unwrap(), &shared));
        assert!(a.downcast::<i64>().is_none());
    }

    #[test]
    fn test_native_function_checks_arity() {
        let f = Function::native(1, |args| Ok(args[0].clone()));
        assert_eq!(f.call(&[Value::Int(3)]), Ok(Value::Int(3)));
        assert_eq!(
            f.call(&[]),
            Err(EvalError::ArityMismatch { expected: 1, got: 0 })
        );
    }
}

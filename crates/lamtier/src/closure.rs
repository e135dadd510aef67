//! Closure storage.
//!
//! A [`Closure`] is a fixed-arity record of typed slots holding hoisted
//! variables. When scopes nest, slot 0 holds the parent closure. The record
//! layout comes from the arity-keyed [`ClosureTypeCache`]; the slot types
//! come from the [`ClosureShape`] it was instantiated from.

mod cache;
mod storage;

use std::fmt;
use std::sync::{Arc, LazyLock};

use itertools::Itertools;
use thiserror::Error;

pub use cache::{ClosureTemplate, ClosureTypeCache, PREBUILT_ARITY, TemplateOrigin};
use storage::SlotStorage;

use crate::types::SemType;
use crate::value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClosureError {
    #[error("Closure slot {slot} is out of range for a closure of arity {arity}")]
    SlotOutOfRange { slot: usize, arity: usize },
    #[error("Closure slot {slot} expects {expected}, got {found}")]
    SlotType {
        slot: usize,
        expected: SemType,
        found: &'static str,
    },
    #[error("Expected a parent closure in slot 0 at hop {hop}, got {found}")]
    NotAClosure { hop: usize, found: &'static str },
    #[error("Closure of arity {expected} cannot be built from {got} values")]
    Arity { expected: usize, got: usize },
    #[error("Variable index {index} is out of range for {count} variables")]
    IndexOutOfRange { index: usize, count: usize },
}

/// A closure template instantiated with slot types.
#[derive(Clone)]
pub struct ClosureShape {
    template: Arc<ClosureTemplate>,
    types: Arc<[SemType]>,
}

static EMPTY_SHAPE: LazyLock<ClosureShape> = LazyLock::new(|| ClosureShape {
    template: ClosureTypeCache::global().template(0),
    types: Arc::from(Vec::new()),
});

static EMPTY_CLOSURE: LazyLock<Closure> = LazyLock::new(|| {
    let shape = ClosureShape::empty();
    let slots = shape.template.allocate(Vec::new());
    Closure(Arc::new(ClosureRecord { shape, slots }))
});

/// Returns the closure shape for a list of slot types.
///
/// Zero slots always yields the shared empty shape.
pub fn get_closure_shape(types: &[SemType]) -> ClosureShape {
    if types.is_empty() {
        return ClosureShape::empty();
    }
    ClosureShape {
        template: ClosureTypeCache::global().template(types.len()),
        types: Arc::from(types),
    }
}

impl ClosureShape {
    pub fn empty() -> ClosureShape {
        EMPTY_SHAPE.clone()
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn types(&self) -> &[SemType] {
        &self.types
    }

    #[inline]
    pub fn origin(&self) -> TemplateOrigin {
        self.template.origin()
    }

    /// Builds a closure from one value per slot.
    pub fn instantiate(&self, values: Vec<Value>) -> Result<Closure, ClosureError> {
        if values.len() != self.arity() {
            return Err(ClosureError::Arity {
                expected: self.arity(),
                got: values.len(),
            });
        }
        if self.arity() == 0 {
            return Ok(Closure::empty());
        }
        if let Some((slot, (ty, value))) = self
            .types
            .iter()
            .zip(&values)
            .enumerate()
            .find(|(_, (ty, value))| !ty.accepts(value))
        {
            return Err(ClosureError::SlotType {
                slot,
                expected: ty.clone(),
                found: value.type_name(),
            });
        }

        let slots = self.template.allocate(values);
        Ok(Closure(Arc::new(ClosureRecord {
            shape: self.clone(),
            slots,
        })))
    }
}

impl PartialEq for ClosureShape {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

impl fmt::Debug for ClosureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClosureShape({}; {:?})",
            self.types.iter().join(", "),
            self.origin()
        )
    }
}

struct ClosureRecord {
    shape: ClosureShape,
    slots: Box<dyn SlotStorage>,
}

/// A shared, mutable record of hoisted variables.
#[derive(Clone)]
pub struct Closure(Arc<ClosureRecord>);

impl Closure {
    /// The shared zero-arity closure.
    pub fn empty() -> Closure {
        EMPTY_CLOSURE.clone()
    }

    pub fn new(types: &[SemType], values: Vec<Value>) -> Result<Closure, ClosureError> {
        get_closure_shape(types).instantiate(values)
    }

    /// Builds a closure whose slot 0 links to `parent`, followed by the given slots.
    pub fn chained(
        parent: &Closure,
        types: &[SemType],
        values: Vec<Value>,
    ) -> Result<Closure, ClosureError> {
        let types = std::iter::once(SemType::Closure)
            .chain(types.iter().cloned())
            .collect::<Vec<_>>();
        let values = std::iter::once(Value::Closure(parent.clone()))
            .chain(values)
            .collect();
        Closure::new(&types, values)
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.0.slots.len()
    }

    #[inline]
    pub fn shape(&self) -> &ClosureShape {
        &self.0.shape
    }

    pub fn get(&self, slot: usize) -> Result<Value, ClosureError> {
        self.0.slots.load(slot).ok_or(ClosureError::SlotOutOfRange {
            slot,
            arity: self.arity(),
        })
    }

    pub fn set(&self, slot: usize, value: Value) -> Result<(), ClosureError> {
        let expected = self
            .0
            .shape
            .types()
            .get(slot)
            .ok_or(ClosureError::SlotOutOfRange {
                slot,
                arity: self.arity(),
            })?;
        if !expected.accepts(&value) {
            return Err(ClosureError::SlotType {
                slot,
                expected: expected.clone(),
                found: value.type_name(),
            });
        }
        self.0.slots.store(slot, value);
        Ok(())
    }

    /// The closure linked from slot 0, if any.
    pub fn parent(&self) -> Option<Closure> {
        match self.0.slots.load(0) {
            Some(Value::Closure(parent)) => Some(parent),
            _ => None,
        }
    }

    #[inline]
    pub fn ptr_eq(a: &Closure, b: &Closure) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({})", self.0.shape.types().iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_empty_closure_is_shared() {
        let a = Closure::new(&[], Vec::new()).unwrap();
        let b = Closure::empty();
        assert!(Closure::ptr_eq(&a, &b));
        assert_eq!(a.arity(), 0);
        assert_eq!(
            a.get(0),
            Err(ClosureError::SlotOutOfRange { slot: 0, arity: 0 })
        );
    }

    #[rstest]
    #[case::prebuilt(3, TemplateOrigin::Prebuilt)]
    #[case::synthesized(PREBUILT_ARITY + 4, TemplateOrigin::Synthesized)]
    fn test_get_closure_shape(#[case] arity: usize, #[case] origin: TemplateOrigin) {
        let shape = get_closure_shape(&vec![SemType::Int; arity]);
        assert_eq!(shape.arity(), arity);
        assert_eq!(shape.origin(), origin);
    }

    #[test]
    fn test_instantiate_checks_types_and_arity() {
        let shape = get_closure_shape(&[SemType::Int, SemType::Str]);
        assert_eq!(
            shape.instantiate(vec![Value::Int(1)]).map(|_| ()),
            Err(ClosureError::Arity { expected: 2, got: 1 })
        );
        assert_eq!(
            shape
                .instantiate(vec![Value::Int(1), Value::Int(2)])
                .map(|_| ()),
            Err(ClosureError::SlotType {
                slot: 1,
                expected: SemType::Str,
                found: "int",
            })
        );
    }

    #[test]
    fn test_set_and_get() {
        let closure = Closure::new(&[SemType::Int, SemType::Any], vec![Value::Int(0), Value::Unit]).unwrap();
        closure.set(0, Value::Int(42)).unwrap();
        closure.set(1, Value::from("any")).unwrap();
        assert_eq!(closure.get(0), Ok(Value::Int(42)));
        assert_eq!(closure.get(1), Ok(Value::from("any")));
        assert_eq!(
            closure.set(0, Value::Bool(true)),
            Err(ClosureError::SlotType {
                slot: 0,
                expected: SemType::Int,
                found: "bool",
            })
        );
        assert_eq!(
            closure.set(2, Value::Unit),
            Err(ClosureError::SlotOutOfRange { slot: 2, arity: 2 })
        );
    }

    #[test]
    fn test_chained_parent() {
        let root = Closure::new(&[SemType::Int], vec![Value::Int(1)]).unwrap();
        let child = Closure::chained(&root, &[SemType::Int], vec![Value::Int(2)]).unwrap();
        assert_eq!(child.arity(), 2);
        assert!(Closure::ptr_eq(&child.parent().unwrap(), &root));
        assert!(root.parent().is_none());
    }
}

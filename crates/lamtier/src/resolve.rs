//! Resolution of hoisted variables across chained closures.

use std::fmt;
use std::sync::Arc;

use crate::closure::{Closure, ClosureError};
use crate::value::Value;

/// The location of a hoisted variable relative to a closure.
///
/// `hops` counts parent links to follow through slot 0, `slot` indexes the
/// closure reached after the last hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarIndex {
    pub hops: u16,
    pub slot: u16,
}

impl VarIndex {
    #[inline]
    pub const fn new(hops: u16, slot: u16) -> Self {
        Self { hops, slot }
    }

    /// Packs the index into one integer, hops in the high 16 bits.
    #[inline]
    pub const fn encode(self) -> u32 {
        ((self.hops as u32) << 16) | self.slot as u32
    }

    #[inline]
    pub const fn decode(encoded: u32) -> Self {
        Self {
            hops: (encoded >> 16) as u16,
            slot: (encoded & 0xFFFF) as u16,
        }
    }

    /// The same slot seen from `extra` scopes further in, or `None` when
    /// the hop count no longer fits.
    #[inline]
    pub(crate) fn deeper(self, extra: u16) -> Option<Self> {
        Some(Self {
            hops: self.hops.checked_add(extra)?,
            slot: self.slot,
        })
    }
}

impl From<u32> for VarIndex {
    fn from(encoded: u32) -> Self {
        VarIndex::decode(encoded)
    }
}

impl fmt::Display for VarIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hops, self.slot)
    }
}

/// Walks `index.hops` parent links starting at `closure` and returns the
/// closure holding the variable together with its slot.
pub fn resolve(closure: &Closure, index: VarIndex) -> Result<(Closure, usize), ClosureError> {
    let mut current = closure.clone();
    for hop in 0..index.hops as usize {
        current = match current.get(0)? {
            Value::Closure(parent) => parent,
            other => {
                return Err(ClosureError::NotAClosure {
                    hop,
                    found: other.type_name(),
                });
            }
        };
    }

    let slot = index.slot as usize;
    if slot >= current.arity() {
        return Err(ClosureError::SlotOutOfRange {
            slot,
            arity: current.arity(),
        });
    }
    Ok((current, slot))
}

/// Indexed view over a set of hoisted variables.
#[derive(Clone)]
pub struct RuntimeVariables {
    closure: Closure,
    indexes: Arc<[VarIndex]>,
}

impl RuntimeVariables {
    pub fn new(closure: Closure, indexes: impl Into<Arc<[VarIndex]>>) -> Self {
        Self {
            closure,
            indexes: indexes.into(),
        }
    }

    pub fn from_encoded(closure: Closure, encoded: &[u32]) -> Self {
        Self::new(
            closure,
            encoded.iter().copied().map(VarIndex::decode).collect::<Vec<_>>(),
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn indexes(&self) -> &[VarIndex] {
        &self.indexes
    }

    fn locate(&self, index: usize) -> Result<(Closure, usize), ClosureError> {
        let var = self
            .indexes
            .get(index)
            .copied()
            .ok_or(ClosureError::IndexOutOfRange {
                index,
                count: self.indexes.len(),
            })?;
        resolve(&self.closure, var)
    }

    pub fn get(&self, index: usize) -> Result<Value, ClosureError> {
        let (closure, slot) = self.locate(index)?;
        closure.get(slot)
    }

    pub fn set(&self, index: usize, value: Value) -> Result<(), ClosureError> {
        let (closure, slot) = self.locate(index)?;
        closure.set(slot, value)
    }
}

impl PartialEq for RuntimeVariables {
    fn eq(&self, other: &Self) -> bool {
        Closure::ptr_eq(&self.closure, &other.closure) && self.indexes == other.indexes
    }
}

impl fmt::Debug for RuntimeVariables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeVariables")
            .field("closure", &self.closure)
            .field("indexes", &self.indexes)
            .finish()
    }
}

/// Builds an accessor over packed variable indexes rooted at `closure`.
pub fn create_runtime_variable_accessor(closure: Closure, encoded: &[u32]) -> RuntimeVariables {
    RuntimeVariables::from_encoded(closure, encoded)
}

//! Slot records backing closures.
//!
//! Arities up to [`super::cache::PREBUILT_ARITY`] use an inline
//! [`FixedSlots`] array; larger closures spill into a boxed slice.

use std::sync::{PoisonError, RwLock};

use crate::value::Value;

pub(crate) trait SlotStorage: Send + Sync {
    fn len(&self) -> usize;

    fn load(&self, slot: usize) -> Option<Value>;

    /// Returns `false` when `slot` is out of range.
    fn store(&self, slot: usize, value: Value) -> bool;
}

#[inline]
fn read(cell: &RwLock<Value>) -> Value {
    cell.read().unwrap_or_else(PoisonError::into_inner).clone()
}

#[inline]
fn write(cell: &RwLock<Value>, value: Value) {
    *cell.write().unwrap_or_else(PoisonError::into_inner) = value;
}

pub(crate) struct FixedSlots<const N: usize> {
    slots: [RwLock<Value>; N],
}

impl<const N: usize> FixedSlots<N> {
    pub(crate) fn from_values(values: Vec<Value>) -> Self {
        let mut values = values.into_iter();
        Self {
            slots: std::array::from_fn(|_| RwLock::new(values.next().unwrap_or_default())),
        }
    }
}

impl<const N: usize> SlotStorage for FixedSlots<N> {
    #[inline(always)]
    fn len(&self) -> usize {
        N
    }

    #[inline]
    fn load(&self, slot: usize) -> Option<Value> {
        self.slots.get(slot).map(read)
    }

    #[inline]
    fn store(&self, slot: usize, value: Value) -> bool {
        match self.slots.get(slot) {
            Some(cell) => {
                write(cell, value);
                true
            }
            None => false,
        }
    }
}

pub(crate) struct SpilledSlots {
    slots: Box<[RwLock<Value>]>,
}

impl SpilledSlots {
    pub(crate) fn from_values(arity: usize, values: Vec<Value>) -> Self {
        let mut values = values.into_iter();
        Self {
            slots: (0..arity)
                .map(|_| RwLock::new(values.next().unwrap_or_default()))
                .collect(),
        }
    }
}

impl SlotStorage for SpilledSlots {
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn load(&self, slot: usize) -> Option<Value> {
        self.slots.get(slot).map(read)
    }

    fn store(&self, slot: usize, value: Value) -> bool {
        match self.slots.get(slot) {
            Some(cell) => {
                write(cell, value);
                true
            }
            None => false,
        }
    }
}

pub(crate) struct NoSlots;

impl SlotStorage for NoSlots {
    fn len(&self) -> usize {
        0
    }

    fn load(&self, _slot: usize) -> Option<Value> {
        None
    }

    fn store(&self, _slot: usize, _value: Value) -> bool {
        false
    }
}

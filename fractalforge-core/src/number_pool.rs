//! Fixed arena of numeric registers.
//!
//! Each compiled program instance owns exactly one pool, created once with
//! the number of slots the compiler assigned. Slots are addressed by
//! [`NumberHandle`]s handed out at compile time. The pool never grows: there is
//! no `push`, only reset of a slot range between pixel evaluations.

use crate::{ComplexNumber, MutableNumber};
use serde::{Deserialize, Serialize};

/// Compile-time index of a register in a [`NumberPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NumberHandle(pub u32);

impl NumberHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct NumberPool {
    slots: Box<[MutableNumber]>,
}

impl NumberPool {
    /// Allocate `size` zeroed registers.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            slots: vec![MutableNumber::default(); size].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn get(&self, handle: NumberHandle) -> ComplexNumber {
        self.slots[handle.index()].get()
    }

    #[inline]
    pub fn set(&mut self, handle: NumberHandle, value: ComplexNumber) {
        self.slots[handle.index()].set(value);
    }

    #[inline]
    pub fn slot_mut(&mut self, handle: NumberHandle) -> &mut MutableNumber {
        &mut self.slots[handle.index()]
    }

    /// Zero the registers in `start..end` without reallocating.
    pub fn reset_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.slots.len());
        for slot in &mut self.slots[start.min(end)..end] {
            slot.clear();
        }
    }

    pub fn reset(&mut self) {
        self.reset_range(0, self.slots.len());
    }

    pub fn as_slice(&self) -> &[MutableNumber] {
        &self.slots
    }

    /// Base pointer of the register file, two `f64`s per slot.
    pub fn as_mut_ptr(&mut self) -> *mut f64 {
        self.slots.as_mut_ptr() as *mut f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_has_fixed_size_and_zeroed_slots() {
        let pool = NumberPool::with_capacity(4);
        assert_eq!(pool.len(), 4);
        assert!(pool.as_slice().iter().all(|n| n.get() == ComplexNumber::ZERO));
    }

    #[test]
    fn reset_range_only_clears_requested_slots() {
        let mut pool = NumberPool::with_capacity(3);
        for i in 0..3 {
            pool.set(NumberHandle(i), ComplexNumber::new(i as f64 + 1.0, 1.0));
        }
        pool.reset_range(0, 2);
        assert_eq!(pool.get(NumberHandle(0)), ComplexNumber::ZERO);
        assert_eq!(pool.get(NumberHandle(1)), ComplexNumber::ZERO);
        assert_eq!(pool.get(NumberHandle(2)), ComplexNumber::new(3.0, 1.0));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn raw_pointer_addresses_register_pairs() {
        let mut pool = NumberPool::with_capacity(2);
        pool.set(NumberHandle(1), ComplexNumber::new(5.0, -6.0));
        let ptr = pool.as_mut_ptr();
        let (re, im) = unsafe { (*ptr.add(2), *ptr.add(3)) };
        assert_eq!((re, im), (5.0, -6.0));
    }
}

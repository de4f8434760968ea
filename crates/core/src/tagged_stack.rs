//! Stamped Value Stack
//!
//! The value stack shared by the host and native functions. Every slot
//! carries a *stamp* next to its value so that handles which cached a slot
//! can tell when the slot has been reused or shifted.
//!
//! ## Slot Layout
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┐
//! │  value: Value        │  stamp: u64          │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! ## Stack Layout
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬─────────┐
//! │  s0 #17  │  s1 #18  │  s2 #40  │  s3 #41  │  ...    │
//! └──────────┴──────────┴──────────┴──────────┴─────────┘
//!                                              ↑ len
//! ```
//!
//! - Grows upward; indices here are raw, 0-based
//! - Stamps come from a monotonically increasing counter and are never reused
//! - Any operation that puts a (possibly different) value at an index gives
//!   that index a fresh stamp: push, insert, remove and rotate (for every
//!   shifted slot), set, resize growth
//! - Stamp 0 is never issued; it means "unbound"

use crate::value::Value;

/// Default stack capacity (number of slots reserved up front)
pub const DEFAULT_STACK_CAPACITY: usize = 64;

/// A stamp value that no slot ever carries
pub const UNBOUND_STAMP: u64 = 0;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    stamp: u64,
}

/// Contiguous array of stamped slots
#[derive(Debug)]
pub struct TaggedStack {
    slots: Vec<Slot>,
    next_stamp: u64,
}

impl TaggedStack {
    /// Create a new stack with the given reserved capacity
    pub fn new(capacity: usize) -> Self {
        TaggedStack {
            slots: Vec::with_capacity(capacity),
            next_stamp: UNBOUND_STAMP + 1,
        }
    }

    /// Create a new stack with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_STACK_CAPACITY)
    }

    /// Get the current stack depth
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reserve room for `n` more values
    pub fn reserve(&mut self, n: usize) {
        self.slots.reserve(n);
    }

    #[inline]
    fn fresh_stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn restamp_from(&mut self, start: usize) {
        for i in start..self.slots.len() {
            let stamp = self.fresh_stamp();
            self.slots[i].stamp = stamp;
        }
    }

    /// Push a value onto the stack
    #[inline]
    pub fn push(&mut self, value: Value) {
        let stamp = self.fresh_stamp();
        self.slots.push(Slot { value, stamp });
    }

    /// Pop a value from the stack
    ///
    /// Panics if the stack is empty.
    #[inline]
    pub fn pop(&mut self) -> Value {
        match self.slots.pop() {
            Some(slot) => slot.value,
            None => panic!("pop: stack is empty"),
        }
    }

    /// Value at a raw index
    ///
    /// Panics if the index is out of range.
    #[inline]
    pub fn get(&self, index: usize) -> &Value {
        &self.slots[index].value
    }

    /// Stamp of a raw index, or None if the index is out of range
    #[inline]
    pub fn stamp(&self, index: usize) -> Option<u64> {
        self.slots.get(index).map(|slot| slot.stamp)
    }

    /// Overwrite the value at a raw index
    pub fn set(&mut self, index: usize, value: Value) {
        let stamp = self.fresh_stamp();
        self.slots[index] = Slot { value, stamp };
    }

    /// Insert a value at a raw index, shifting everything above up by one
    pub fn insert(&mut self, index: usize, value: Value) {
        self.slots.insert(
            index,
            Slot {
                value,
                stamp: UNBOUND_STAMP,
            },
        );
        self.restamp_from(index);
    }

    /// Remove the value at a raw index, shifting everything above down by one
    pub fn remove(&mut self, index: usize) -> Value {
        let slot = self.slots.remove(index);
        self.restamp_from(index);
        slot.value
    }

    /// Rotate the slots in `start..len` by `n` positions towards the top
    ///
    /// Negative `n` rotates towards the bottom.
    pub fn rotate(&mut self, start: usize, n: isize) {
        let segment = &mut self.slots[start..];
        if segment.is_empty() {
            return;
        }
        let shift = n.rem_euclid(segment.len() as isize) as usize;
        segment.rotate_right(shift);
        self.restamp_from(start);
    }

    /// Grow (with nils) or shrink the stack to exactly `len` slots
    pub fn resize(&mut self, len: usize) {
        if len <= self.slots.len() {
            self.slots.truncate(len);
        } else {
            while self.slots.len() < len {
                self.push(Value::Nil);
            }
        }
    }

    /// Remove and return every value from raw index `start` upward
    pub fn drain_from(&mut self, start: usize) -> Vec<Value> {
        self.slots.drain(start..).map(|slot| slot.value).collect()
    }
}

impl Default for TaggedStack {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn int(stack: &TaggedStack, i: usize) -> i64 {
        match stack.get(i) {
            Value::Int(n) => *n,
            other => panic!("expected Int, got {:?}", other),
        }
    }

    #[test]
    fn test_stack_basic_operations() {
        let mut stack = TaggedStack::new(16);

        assert!(stack.is_empty());
        assert_eq!(stack.len(), 0);

        stack.push(Value::Int(10));
        stack.push(Value::Int(20));
        stack.push(Value::Int(30));
        assert_eq!(stack.len(), 3);

        assert_eq!(stack.pop(), Value::Int(30));
        assert_eq!(stack.pop(), Value::Int(20));
        assert_eq!(stack.pop(), Value::Int(10));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_push_after_pop_gets_new_stamp() {
        let mut stack = TaggedStack::new(4);
        stack.push(Value::Int(1));
        let first = stack.stamp(0).unwrap();
        stack.pop();
        stack.push(Value::Int(1));
        assert_ne!(stack.stamp(0).unwrap(), first);
        assert_ne!(first, UNBOUND_STAMP);
    }

    #[test]
    fn test_remove_restamps_shifted_slots_only() {
        let mut stack = TaggedStack::new(4);
        for i in 0..4 {
            stack.push(Value::Int(i));
        }
        let below = stack.stamp(0).unwrap();
        let shifted = stack.stamp(2).unwrap();

        assert_eq!(stack.remove(1), Value::Int(1));
        assert_eq!(stack.stamp(0), Some(below));
        assert_eq!(int(&stack, 1), 2);
        assert_ne!(stack.stamp(1), Some(shifted));
        assert_eq!(stack.stamp(3), None);
    }

    #[test]
    fn test_insert_and_rotate() {
        let mut stack = TaggedStack::new(4);
        for i in 1..=3 {
            stack.push(Value::Int(i));
        }
        stack.insert(0, Value::Int(0));
        assert_eq!(
            (0..4).map(|i| int(&stack, i)).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );

        stack.rotate(1, 1);
        assert_eq!(
            (0..4).map(|i| int(&stack, i)).collect::<Vec<_>>(),
            vec![0, 3, 1, 2]
        );

        stack.rotate(1, -1);
        assert_eq!(
            (0..4).map(|i| int(&stack, i)).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_resize_and_drain() {
        let mut stack = TaggedStack::new(2);
        stack.push(Value::Int(7));
        stack.resize(3);
        assert_eq!(stack.len(), 3);
        assert!(stack.get(2).is_nil());

        let drained = stack.drain_from(1);
        assert_eq!(drained.len(), 2);
        assert_eq!(stack.len(), 1);
        stack.resize(0);
        assert!(stack.is_empty());
    }

    #[test]
    #[should_panic(expected = "pop: stack is empty")]
    fn test_pop_empty_panics() {
        let mut stack = TaggedStack::new(1);
        stack.pop();
    }
}

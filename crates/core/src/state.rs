//! VM State
//!
//! One embedded runtime instance: a value stack, a global table and the
//! protected-call machinery. Every operation takes `&self`; the state uses
//! interior mutability so that handles can alias it and native functions can
//! re-enter it during a protected call.
//!
//! # Stack positions
//!
//! ```text
//!          raw:   0     1     2  │  3     4     5
//!                 f     a1    a2 │  x     y     z
//!                                │  ↑ frame base (position 1)
//!   positive:                    │  1     2     3
//!   negative:                    │ -3    -2    -1
//! ```
//!
//! Positive positions count from the base of the current call frame (1 is
//! the oldest slot visible to the caller), negative positions count from the
//! top (-1 is the newest). Position 0 is never valid.
//!
//! # Threading
//!
//! A `State` is single-threaded (`!Send`, `!Sync`). Run one per thread.

use crate::error::{RuntimeError, Status, format_panic_payload};
use crate::number::{Numeral, float_to_integer, format_float, parse_numeral};
use crate::tagged_stack::{DEFAULT_STACK_CAPACITY, TaggedStack};
use crate::value::{HostFn, NativeFn, Str, TableRef, TypeTag, Value};
use std::cell::{RefCell, RefMut};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use tracing::{debug, trace};

/// Request every result of a protected call
pub const MULTRET: i32 = -1;

/// Default maximum stack depth
pub const DEFAULT_MAX_STACK: usize = 1_000_000;

/// Default maximum nesting of protected calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Limits for one VM state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateConfig {
    /// Slots reserved when the state is created
    pub initial_stack: usize,
    /// Upper bound enforced by `ensure_capacity`
    pub max_stack: usize,
    /// Upper bound on nested protected calls
    pub max_call_depth: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            initial_stack: DEFAULT_STACK_CAPACITY,
            max_stack: DEFAULT_MAX_STACK,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Identity of one stack slot at one point in time
///
/// A `SlotId` stays resolvable only while the slot keeps the stamp it had
/// when the id was taken. Any push into a popped slot, or any insert, remove,
/// rotate, replace or copy that touches it, invalidates the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    raw: usize,
    stamp: u64,
}

struct Inner {
    stack: TaggedStack,
    /// Raw index of position 1 in the current frame
    base: usize,
    depth: usize,
    globals: TableRef,
}

impl Inner {
    fn resolve(&self, index: i32) -> Option<usize> {
        let len = self.stack.len();
        if index > 0 {
            let raw = self.base + (index as usize - 1);
            (raw < len).then_some(raw)
        } else if index < 0 {
            let back = index.unsigned_abs() as usize;
            (back <= len - self.base).then(|| len - back)
        } else {
            None
        }
    }

    fn resolve_or_panic(&self, index: i32, op: &str) -> usize {
        match self.resolve(index) {
            Some(raw) => raw,
            None => panic!("{}: invalid stack position {}", op, index),
        }
    }

    fn frame_len(&self) -> usize {
        self.stack.len() - self.base
    }
}

/// An embedded runtime instance
pub struct State {
    inner: RefCell<Inner>,
    config: StateConfig,
}

impl State {
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    pub fn with_config(config: StateConfig) -> Self {
        State {
            inner: RefCell::new(Inner {
                stack: TaggedStack::new(config.initial_stack),
                base: 0,
                depth: 0,
                globals: TableRef::new(0, 0),
            }),
            config,
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    fn inner(&self) -> RefMut<'_, Inner> {
        self.inner.borrow_mut()
    }

    // =========================================================================
    // Stack bookkeeping
    // =========================================================================

    /// Position of the top slot (number of slots in the current frame)
    pub fn top(&self) -> i32 {
        self.inner.borrow().frame_len() as i32
    }

    /// Grow (with nil) or shrink the current frame
    ///
    /// Non-negative `index` sets the frame size; negative `index` keeps
    /// everything up to and including that position.
    pub fn set_top(&self, index: i32) {
        let mut inner = self.inner();
        let new_len = if index >= 0 {
            inner.base + index as usize
        } else {
            let back = (index.unsigned_abs() as usize) - 1;
            assert!(
                back <= inner.frame_len(),
                "set_top: invalid stack position {}",
                index
            );
            inner.stack.len() - back
        };
        inner.stack.resize(new_len);
    }

    /// Pop `n` slots
    pub fn pop(&self, n: usize) {
        let mut inner = self.inner();
        assert!(
            n <= inner.frame_len(),
            "pop: cannot pop {} of {} slots",
            n,
            inner.frame_len()
        );
        let len = inner.stack.len();
        inner.stack.resize(len - n);
    }

    /// Convert a position into an equivalent positive position
    pub fn abs_index(&self, index: i32) -> i32 {
        if index > 0 {
            index
        } else {
            self.top() + index + 1
        }
    }

    /// Check that `n` more slots fit under the configured maximum
    pub fn ensure_capacity(&self, n: usize) -> bool {
        let mut inner = self.inner();
        let len = inner.stack.len();
        if len.saturating_add(n) > self.config.max_stack {
            debug!(len, n, max = self.config.max_stack, "stack capacity exceeded");
            return false;
        }
        inner.stack.reserve(n);
        true
    }

    /// Remove the slot at `index`, shifting the slots above it down
    pub fn remove(&self, index: i32) {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "remove");
        inner.stack.remove(raw);
    }

    /// Move the top slot into `index`, shifting the slots above it up
    pub fn insert(&self, index: i32) {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "insert");
        let value = inner.stack.pop();
        inner.stack.insert(raw, value);
    }

    /// Pop the top slot into `index`
    pub fn replace(&self, index: i32) {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "replace");
        let value = inner.stack.pop();
        if raw < inner.stack.len() {
            inner.stack.set(raw, value);
        }
    }

    /// Copy the value at `from` into `to`
    pub fn copy(&self, from: i32, to: i32) {
        let mut inner = self.inner();
        let src = inner.resolve_or_panic(from, "copy");
        let dst = inner.resolve_or_panic(to, "copy");
        let value = inner.stack.get(src).clone();
        inner.stack.set(dst, value);
    }

    /// Rotate the slots between `index` and the top by `n` positions
    /// towards the top (negative `n` rotates towards the bottom)
    pub fn rotate(&self, index: i32, n: i32) {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "rotate");
        inner.stack.rotate(raw, n as isize);
    }

    /// Push a copy of the value at `index`
    pub fn push_value(&self, index: i32) {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "push_value");
        let value = inner.stack.get(raw).clone();
        inner.stack.push(value);
    }

    /// Identity of the slot at `index`, for handles that cache positions
    pub fn slot_id(&self, index: i32) -> Option<SlotId> {
        let inner = self.inner.borrow();
        let raw = inner.resolve(index)?;
        let stamp = inner.stack.stamp(raw)?;
        Some(SlotId { raw, stamp })
    }

    /// Current positive position of a slot, if it is still the same slot
    /// and still visible from the current frame
    pub fn index_of(&self, slot: SlotId) -> Option<i32> {
        let inner = self.inner.borrow();
        if slot.raw < inner.base || inner.stack.stamp(slot.raw) != Some(slot.stamp) {
            return None;
        }
        Some((slot.raw - inner.base + 1) as i32)
    }

    // =========================================================================
    // Push
    // =========================================================================

    pub fn push(&self, value: Value) {
        self.inner().stack.push(value);
    }

    pub fn push_nil(&self) {
        self.push(Value::Nil);
    }

    pub fn push_boolean(&self, b: bool) {
        self.push(Value::Bool(b));
    }

    pub fn push_integer(&self, i: i64) {
        self.push(Value::Int(i));
    }

    pub fn push_number(&self, n: f64) {
        self.push(Value::Number(n));
    }

    /// Push a string; the bytes are copied into runtime storage
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.push(Value::Str(Str::new(bytes)));
    }

    pub fn push_str(&self, s: Str) {
        self.push(Value::Str(s));
    }

    pub fn push_function(&self, f: NativeFn) {
        self.push(Value::Function(f));
    }

    pub fn push_closure(&self, f: HostFn) {
        self.push(Value::Closure(f));
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Clone of the value at `index`, or None for an invalid position
    pub fn value(&self, index: i32) -> Option<Value> {
        let inner = self.inner.borrow();
        inner.resolve(index).map(|raw| inner.stack.get(raw).clone())
    }

    pub fn type_tag(&self, index: i32) -> TypeTag {
        self.with_value(index, |v| v.map_or(TypeTag::None, Value::type_tag))
    }

    /// True for the integer sub-kind of number
    pub fn is_integer(&self, index: i32) -> bool {
        self.with_value(index, |v| matches!(v, Some(Value::Int(_))))
    }

    pub fn to_integer(&self, index: i32) -> Option<i64> {
        self.with_value(index, |v| match v? {
            Value::Int(i) => Some(*i),
            Value::Number(n) => float_to_integer(*n),
            Value::Str(s) => match parse_numeral(s.as_bytes())? {
                Numeral::Int(i) => Some(i),
                Numeral::Float(n) => float_to_integer(n),
            },
            _ => None,
        })
    }

    pub fn to_number(&self, index: i32) -> Option<f64> {
        self.with_value(index, |v| match v? {
            Value::Int(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            Value::Str(s) => match parse_numeral(s.as_bytes())? {
                Numeral::Int(i) => Some(i as f64),
                Numeral::Float(n) => Some(n),
            },
            _ => None,
        })
    }

    /// Truthiness: false only for nil, false and invalid positions
    pub fn to_boolean(&self, index: i32) -> bool {
        self.with_value(index, |v| v.is_some_and(Value::is_truthy))
    }

    /// String contents; numbers are formatted. The slot is left untouched.
    pub fn to_str(&self, index: i32) -> Option<Str> {
        self.with_value(index, |v| match v? {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(Str::from(i.to_string())),
            Value::Number(n) => Some(Str::from(format_float(*n))),
            _ => None,
        })
    }

    /// Native function pointer; host closures do not convert
    pub fn to_function(&self, index: i32) -> Option<NativeFn> {
        self.with_value(index, |v| match v? {
            Value::Function(f) => Some(*f),
            _ => None,
        })
    }

    fn with_value<R>(&self, index: i32, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let inner = self.inner.borrow();
        let value = inner.resolve(index).map(|raw| inner.stack.get(raw));
        f(value)
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Push a new empty table
    pub fn create_table(&self, narr: usize, nrec: usize) {
        self.push(Value::Table(TableRef::new(narr, nrec)));
    }

    fn table_at(inner: &Inner, raw: usize, op: &str) -> Result<TableRef, RuntimeError> {
        match inner.stack.get(raw) {
            Value::Table(t) => Ok(t.clone()),
            other => Err(RuntimeError::new(format!(
                "{}: attempt to index a {} value",
                op,
                other.type_name()
            ))),
        }
    }

    /// Pop a key and push `t[key]` where `t` is at `index`
    ///
    /// Always leaves exactly one value in place of the key (nil on error).
    pub fn get_table(&self, index: i32) -> Result<TypeTag, RuntimeError> {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "get_table");
        let key = inner.stack.pop();
        let fetched = Self::table_at(&inner, raw, "get_table").map(|t| t.borrow().get(&key));
        Self::push_fetched(&mut inner, fetched)
    }

    /// Push `t[name]` where `t` is at `index`
    pub fn get_field(&self, index: i32, name: &str) -> Result<TypeTag, RuntimeError> {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "get_field");
        let fetched = Self::table_at(&inner, raw, "get_field").map(|t| t.borrow().get_str(name));
        Self::push_fetched(&mut inner, fetched)
    }

    fn push_fetched(
        inner: &mut Inner,
        fetched: Result<Value, RuntimeError>,
    ) -> Result<TypeTag, RuntimeError> {
        match fetched {
            Ok(value) => {
                let tag = value.type_tag();
                inner.stack.push(value);
                Ok(tag)
            }
            Err(err) => {
                inner.stack.push(Value::Nil);
                Err(err)
            }
        }
    }

    /// Pop a value and a key and store `t[key] = value` where `t` is at `index`
    pub fn set_table(&self, index: i32) -> Result<(), RuntimeError> {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "set_table");
        assert!(inner.frame_len() >= 2, "set_table: missing key or value");
        let value = inner.stack.pop();
        let key = inner.stack.pop();
        let table = Self::table_at(&inner, raw, "set_table")?;
        let mut data = table.borrow_mut();
        data.set(&key, value)
    }

    /// Pop a value and store `t[name] = value` where `t` is at `index`
    pub fn set_field(&self, index: i32, name: &str) -> Result<(), RuntimeError> {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "set_field");
        let value = inner.stack.pop();
        let table = Self::table_at(&inner, raw, "set_field")?;
        let mut data = table.borrow_mut();
        data.set(&Value::from(name), value)
    }

    /// Push the length of the value at `index`
    ///
    /// Strings report their byte length, tables their border. Anything else
    /// is an error; nil is pushed in that case.
    pub fn length(&self, index: i32) -> Result<(), RuntimeError> {
        let mut inner = self.inner();
        let raw = inner.resolve_or_panic(index, "length");
        let length = match inner.stack.get(raw) {
            Value::Str(s) => Ok(s.len() as i64),
            Value::Table(t) => Ok(t.borrow().border()),
            other => Err(RuntimeError::new(format!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        };
        match length {
            Ok(n) => {
                inner.stack.push(Value::Int(n));
                Ok(())
            }
            Err(err) => {
                inner.stack.push(Value::Nil);
                Err(err)
            }
        }
    }

    // =========================================================================
    // Globals
    // =========================================================================

    /// Push the global `name` (nil when absent)
    pub fn get_global(&self, name: &str) -> TypeTag {
        let mut inner = self.inner();
        let value = inner.globals.borrow().get_str(name);
        let tag = value.type_tag();
        inner.stack.push(value);
        tag
    }

    /// Pop a value into the global `name`; nil deletes it
    pub fn set_global(&self, name: &str) {
        let mut inner = self.inner();
        assert!(inner.frame_len() >= 1, "set_global: stack is empty");
        let value = inner.stack.pop();
        let globals = inner.globals.clone();
        let mut data = globals.borrow_mut();
        // String keys are always valid
        let _ = data.set(&Value::from(name), value);
    }

    // =========================================================================
    // Protected call
    // =========================================================================

    /// Call the value below the top `nargs` slots
    ///
    /// On success the callee and its arguments are replaced by the results,
    /// adjusted to `nresults` (or all of them with [`MULTRET`]). On failure
    /// they are replaced by a single error object. When `msgh` is non-zero
    /// the function at that position transforms the error message first.
    pub fn pcall(&self, nargs: usize, nresults: i32, msgh: i32) -> Status {
        let (func_raw, handler) = {
            let inner = self.inner.borrow();
            assert!(
                nargs < inner.frame_len(),
                "pcall: expected a callee and {} arguments, frame holds {}",
                nargs,
                inner.frame_len()
            );
            let handler = (msgh != 0).then(|| {
                let raw = inner.resolve_or_panic(msgh, "pcall");
                inner.stack.get(raw).clone()
            });
            (inner.stack.len() - nargs - 1, handler)
        };

        trace!(nargs, nresults, msgh, "pcall");
        match self.invoke(func_raw, nresults) {
            Ok(()) => Status::Ok,
            Err(err) => {
                debug!(error = %err, "protected call failed");
                let error_object = match handler {
                    Some(handler) => self.run_handler(func_raw, handler, err),
                    None => Value::Str(Str::from(err.into_message())),
                };
                let mut inner = self.inner();
                inner.stack.resize(func_raw);
                inner.stack.push(error_object);
                Status::ErrRun
            }
        }
    }

    fn invoke(&self, func_raw: usize, nresults: i32) -> Result<(), RuntimeError> {
        let (callee, saved_base) = {
            let mut inner = self.inner();
            if inner.depth >= self.config.max_call_depth {
                return Err(RuntimeError::new("stack overflow (call depth)"));
            }
            let callee = inner.stack.get(func_raw).clone();
            if !matches!(callee, Value::Function(_) | Value::Closure(_)) {
                return Err(RuntimeError::new(format!(
                    "attempt to call a {} value",
                    callee.type_name()
                )));
            }
            let saved_base = inner.base;
            inner.base = func_raw + 1;
            inner.depth += 1;
            (callee, saved_base)
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| match &callee {
            Value::Function(f) => f(self),
            Value::Closure(c) => c(self),
            _ => unreachable!("callee checked above"),
        }));

        let mut inner = self.inner();
        inner.base = saved_base;
        inner.depth -= 1;

        let produced = match outcome {
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(err),
            Err(payload) => return Err(RuntimeError::new(format_panic_payload(&payload))),
        };

        let available = inner.stack.len().saturating_sub(func_raw + 1);
        if produced > available {
            return Err(RuntimeError::new(format!(
                "function reported {} results but left {}",
                produced, available
            )));
        }

        let first = inner.stack.len() - produced;
        let mut results = inner.stack.drain_from(first);
        inner.stack.resize(func_raw);
        if nresults >= 0 {
            results.resize(nresults as usize, Value::Nil);
        }
        for value in results {
            inner.stack.push(value);
        }
        Ok(())
    }

    fn run_handler(&self, func_raw: usize, handler: Value, err: RuntimeError) -> Value {
        {
            let mut inner = self.inner();
            inner.stack.resize(func_raw);
            inner.stack.push(handler);
            inner.stack.push(Value::Str(Str::from(err.message())));
        }
        match self.invoke(func_raw, 1) {
            Ok(()) => self.inner().stack.pop(),
            Err(handler_err) => {
                debug!(error = %handler_err, "message handler failed");
                self.inner().stack.resize(func_raw);
                Value::Str(Str::from(err.into_message()))
            }
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("State")
                .field("top", &inner.frame_len())
                .field("base", &inner.base)
                .field("depth", &inner.depth)
                .finish(),
            Err(_) => f.write_str("State { <busy> }"),
        }
    }
}

/// Box a Rust closure as a [`HostFn`]
pub fn host_fn(f: impl Fn(&State) -> Result<usize, RuntimeError> + 'static) -> HostFn {
    Rc::new(f)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn add_one(state: &State) -> Result<usize, RuntimeError> {
        let a = state
            .to_integer(1)
            .ok_or_else(|| RuntimeError::new("bad argument #1"))?;
        state.push_integer(a + 1);
        Ok(1)
    }

    fn fail(_: &State) -> Result<usize, RuntimeError> {
        Err(RuntimeError::new("boom"))
    }

    fn explode(_: &State) -> Result<usize, RuntimeError> {
        panic!("native panic")
    }

    fn two_results(state: &State) -> Result<usize, RuntimeError> {
        state.push_integer(1);
        state.push_integer(2);
        Ok(2)
    }

    fn decorate(state: &State) -> Result<usize, RuntimeError> {
        let msg = state.to_str(1).map(|s| s.to_string_lossy()).unwrap_or_default();
        state.push_bytes(format!("handled: {}", msg).as_bytes());
        Ok(1)
    }

    #[test]
    fn test_positions() {
        let state = State::new();
        state.push_integer(10);
        state.push_integer(20);
        state.push_integer(30);
        assert_eq!(state.top(), 3);
        assert_eq!(state.to_integer(1), Some(10));
        assert_eq!(state.to_integer(-1), Some(30));
        assert_eq!(state.to_integer(-3), Some(10));
        assert_eq!(state.type_tag(4), TypeTag::None);
        assert_eq!(state.type_tag(-4), TypeTag::None);
        assert_eq!(state.type_tag(0), TypeTag::None);
        assert_eq!(state.abs_index(-1), 3);
    }

    #[test]
    fn test_set_top_pop_and_shuffles() {
        let state = State::new();
        state.set_top(3);
        assert_eq!(state.top(), 3);
        assert_eq!(state.type_tag(3), TypeTag::Nil);
        state.pop(3);
        assert_eq!(state.top(), 0);

        for i in 1..=4 {
            state.push_integer(i);
        }
        state.remove(1);
        assert_eq!(state.to_integer(1), Some(2));
        state.insert(1);
        assert_eq!(state.to_integer(1), Some(4));
        state.push_integer(9);
        state.replace(2);
        assert_eq!(state.to_integer(2), Some(9));
        state.copy(1, 3);
        assert_eq!(state.to_integer(3), Some(4));
        state.rotate(1, 1);
        assert_eq!(state.to_integer(1), Some(4));
        state.push_value(1);
        assert_eq!(state.top(), 4);
        state.set_top(-3);
        assert_eq!(state.top(), 2);
    }

    #[test]
    fn test_slot_ids_detect_reuse() {
        let state = State::new();
        state.push_integer(1);
        state.push_integer(2);
        let slot = state.slot_id(-1).unwrap();
        assert_eq!(state.index_of(slot), Some(2));

        state.pop(1);
        assert_eq!(state.index_of(slot), None);
        state.push_integer(2);
        assert_eq!(state.index_of(slot), None);

        let low = state.slot_id(1).unwrap();
        let high = state.slot_id(2).unwrap();
        state.push_integer(0);
        state.insert(2);
        assert_eq!(state.index_of(low), Some(1));
        assert_eq!(state.index_of(high), None);
    }

    #[test]
    fn test_conversions() {
        let state = State::new();
        state.push_number(3.0);
        state.push_number(3.5);
        state.push_bytes(b" 12 ");
        state.push_bytes(b"abc");
        state.push_boolean(false);
        state.push_nil();

        assert_eq!(state.to_integer(1), Some(3));
        assert!(!state.is_integer(1));
        assert_eq!(state.to_integer(2), None);
        assert_eq!(state.to_number(2), Some(3.5));
        assert_eq!(state.to_integer(3), Some(12));
        assert_eq!(state.to_integer(4), None);
        assert_eq!(state.to_number(4), None);
        assert!(state.to_boolean(4));
        assert!(!state.to_boolean(5));
        assert!(!state.to_boolean(6));
        assert!(!state.to_boolean(7));
        assert_eq!(state.to_str(1).unwrap().as_bytes(), b"3.0");
        assert_eq!(state.to_str(6), None);
        assert_eq!(state.type_tag(1), TypeTag::Number);
    }

    #[test]
    fn test_closures_are_not_native_functions() {
        let state = State::new();
        state.push_function(add_one);
        state.push_closure(host_fn(|_| Ok(0)));
        assert_eq!(state.type_tag(1), TypeTag::Function);
        assert_eq!(state.type_tag(2), TypeTag::Function);
        assert!(state.to_function(1).is_some());
        assert!(state.to_function(2).is_none());
    }

    #[test]
    fn test_tables_and_globals() {
        let state = State::new();
        state.create_table(0, 2);
        state.push_bytes(b"X");
        state.set_field(1, "firstname").unwrap();
        state.push_integer(1);
        state.push_bytes(b"first");
        state.set_table(1).unwrap();
        assert_eq!(state.top(), 1);

        assert_eq!(state.get_field(1, "firstname").unwrap(), TypeTag::String);
        assert_eq!(state.to_str(-1).unwrap().as_bytes(), b"X");
        state.pop(1);

        state.push_number(1.0);
        assert_eq!(state.get_table(1).unwrap(), TypeTag::String);
        state.pop(1);

        state.length(1).unwrap();
        assert_eq!(state.to_integer(-1), Some(1));
        state.pop(1);

        state.set_global("name");
        assert_eq!(state.top(), 0);
        assert_eq!(state.get_global("name"), TypeTag::Table);
        assert_eq!(state.get_global("missing"), TypeTag::Nil);
        state.pop(2);

        state.push_nil();
        state.set_global("name");
        assert_eq!(state.get_global("name"), TypeTag::Nil);
        state.pop(1);
    }

    #[test]
    fn test_indexing_non_table_is_an_error() {
        let state = State::new();
        state.push_integer(5);
        assert!(state.get_field(1, "x").is_err());
        assert_eq!(state.top(), 2);
        assert_eq!(state.type_tag(-1), TypeTag::Nil);
        state.pop(1);

        state.push_nil();
        state.push_integer(1);
        let err = state.set_table(1).unwrap_err();
        assert!(err.message().contains("number"));
        assert_eq!(state.top(), 1);

        assert!(state.length(1).is_err());
        assert_eq!(state.top(), 2);
    }

    #[test]
    fn test_pcall_success_adjusts_results() {
        let state = State::new();
        state.push_function(add_one);
        state.push_integer(41);
        assert_eq!(state.pcall(1, 1, 0), Status::Ok);
        assert_eq!(state.top(), 1);
        assert_eq!(state.to_integer(-1), Some(42));
        state.pop(1);

        state.push_function(two_results);
        assert_eq!(state.pcall(0, 3, 0), Status::Ok);
        assert_eq!(state.top(), 3);
        assert_eq!(state.type_tag(3), TypeTag::Nil);
        state.pop(3);

        state.push_function(two_results);
        assert_eq!(state.pcall(0, 1, 0), Status::Ok);
        assert_eq!(state.to_integer(-1), Some(1));
        state.pop(1);

        state.push_function(two_results);
        assert_eq!(state.pcall(0, MULTRET, 0), Status::Ok);
        assert_eq!(state.top(), 2);
    }

    #[test]
    fn test_pcall_errors_leave_message() {
        let state = State::new();
        state.push_integer(7);
        state.push_function(fail);
        state.push_integer(1);
        assert_eq!(state.pcall(1, 1, 0), Status::ErrRun);
        assert_eq!(state.top(), 2);
        assert_eq!(state.to_str(-1).unwrap().as_bytes(), b"boom");
        state.pop(1);

        state.push_function(explode);
        assert_eq!(state.pcall(0, 0, 0), Status::ErrRun);
        assert_eq!(state.to_str(-1).unwrap().as_bytes(), b"native panic");
        state.pop(1);

        state.push_nil();
        assert_eq!(state.pcall(0, 0, 0), Status::ErrRun);
        assert_eq!(
            state.to_str(-1).unwrap().as_bytes(),
            b"attempt to call a nil value"
        );
        state.pop(1);
        assert_eq!(state.top(), 1);
        assert_eq!(state.to_integer(1), Some(7));
    }

    #[test]
    fn test_pcall_message_handler() {
        let state = State::new();
        state.push_function(decorate);
        state.push_function(fail);
        assert_eq!(state.pcall(0, 0, 1), Status::ErrRun);
        assert_eq!(state.top(), 2);
        assert_eq!(state.to_str(-1).unwrap().as_bytes(), b"handled: boom");
    }

    #[test]
    fn test_native_frames_are_relative() {
        fn frame_probe(state: &State) -> Result<usize, RuntimeError> {
            // Only the two arguments are visible
            let top = state.top() as i64;
            state.push_integer(top);
            Ok(1)
        }

        let state = State::new();
        state.push_integer(100);
        state.push_integer(200);
        state.push_function(frame_probe);
        state.push_integer(1);
        state.push_integer(2);
        assert_eq!(state.pcall(2, 1, 0), Status::Ok);
        assert_eq!(state.to_integer(-1), Some(2));
        assert_eq!(state.top(), 3);
    }

    #[test]
    fn test_call_depth_limit() {
        fn recurse(state: &State) -> Result<usize, RuntimeError> {
            state.push_function(recurse);
            match state.pcall(0, 0, 0) {
                Status::Ok => Ok(0),
                _ => {
                    let msg = state.to_str(-1).map(|s| s.to_string_lossy()).unwrap_or_default();
                    Err(RuntimeError::new(msg))
                }
            }
        }

        let state = State::with_config(StateConfig {
            max_call_depth: 8,
            ..StateConfig::default()
        });
        state.push_function(recurse);
        assert_eq!(state.pcall(0, 0, 0), Status::ErrRun);
        assert_eq!(
            state.to_str(-1).unwrap().as_bytes(),
            b"stack overflow (call depth)"
        );
    }

    #[test]
    fn test_ensure_capacity() {
        let state = State::with_config(StateConfig {
            max_stack: 4,
            ..StateConfig::default()
        });
        assert!(state.ensure_capacity(4));
        state.push_nil();
        assert!(!state.ensure_capacity(4));
        assert!(state.ensure_capacity(3));
    }
}

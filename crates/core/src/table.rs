//! Composite (table) storage
//!
//! Tables are associative arrays keyed by any non-nil value. Keys are
//! normalised on the way in: a float with an exact integer value is stored
//! under the integer key, so `t[1.0]` and `t[1]` name the same entry.
//! Storing nil removes the entry.

use crate::error::RuntimeError;
use crate::number::float_to_integer;
use crate::value::{HostFn, NativeFn, Str, TableRef, Value};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Table key: the hashable form of a non-nil, non-NaN value
///
/// Functions and tables hash by identity.
#[derive(Clone)]
pub enum Key {
    Bool(bool),
    Int(i64),
    /// Non-integral float, by bit pattern
    Float(u64),
    Str(Str),
    Function(NativeFn),
    Closure(HostFn),
    Table(TableRef),
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Bool(a), Key::Bool(b)) => a == b,
            (Key::Int(a), Key::Int(b)) => a == b,
            (Key::Float(a), Key::Float(b)) => a == b,
            (Key::Str(a), Key::Str(b)) => a == b,
            (Key::Function(a), Key::Function(b)) => *a as usize == *b as usize,
            (Key::Closure(a), Key::Closure(b)) => Rc::ptr_eq(a, b),
            (Key::Table(a), Key::Table(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Discriminant for type safety
        std::mem::discriminant(self).hash(state);
        match self {
            Key::Bool(b) => b.hash(state),
            Key::Int(i) => i.hash(state),
            Key::Float(bits) => bits.hash(state),
            Key::Str(s) => s.hash(state),
            Key::Function(f) => (*f as usize).hash(state),
            Key::Closure(c) => (Rc::as_ptr(c) as *const () as usize).hash(state),
            Key::Table(t) => t.id().hash(state),
        }
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({:?})", self.to_value())
    }
}

impl Key {
    /// Try to convert a Value to a Key
    ///
    /// Returns None for nil and NaN, which can never be keys.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Nil => None,
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Number(n) if n.is_nan() => None,
            Value::Number(n) => Some(match float_to_integer(*n) {
                Some(i) => Key::Int(i),
                None => Key::Float(n.to_bits()),
            }),
            Value::Str(s) => Some(Key::Str(s.clone())),
            Value::Function(f) => Some(Key::Function(*f)),
            Value::Closure(c) => Some(Key::Closure(c.clone())),
            Value::Table(t) => Some(Key::Table(t.clone())),
        }
    }

    /// Convert a Key back to a Value
    pub fn to_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(bits) => Value::Number(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Function(f) => Value::Function(*f),
            Key::Closure(c) => Value::Closure(c.clone()),
            Key::Table(t) => Value::Table(t.clone()),
        }
    }
}

/// Contents of one table
#[derive(Debug, Default)]
pub struct TableData {
    entries: HashMap<Key, Value>,
}

impl TableData {
    /// Create an empty table sized for `narr` sequence and `nrec` record entries
    pub fn with_capacity(narr: usize, nrec: usize) -> Self {
        TableData {
            entries: HashMap::with_capacity(narr.saturating_add(nrec)),
        }
    }

    /// Raw read; absent keys (and keys that can never exist) read as nil
    pub fn get(&self, key: &Value) -> Value {
        Key::from_value(key)
            .and_then(|k| self.entries.get(&k).cloned())
            .unwrap_or_default()
    }

    pub fn get_str(&self, name: &str) -> Value {
        self.entries
            .get(&Key::Str(Str::from(name)))
            .cloned()
            .unwrap_or_default()
    }

    /// Raw write; storing nil removes the entry
    pub fn set(&mut self, key: &Value, value: Value) -> Result<(), RuntimeError> {
        let key = match Key::from_value(key) {
            Some(k) => k,
            None if key.is_nil() => return Err(RuntimeError::new("index is nil")),
            None => return Err(RuntimeError::new("index is NaN")),
        };
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
        Ok(())
    }

    /// Border of the sequence part: the largest n with t[1..=n] all non-nil
    ///
    /// Linear in the border; nothing caches it between calls.
    pub fn border(&self) -> i64 {
        let mut n = 0i64;
        while self.entries.contains_key(&Key::Int(n + 1)) {
            n += 1;
        }
        n
    }

    /// Number of non-nil entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_keys_normalise_to_integers() {
        let mut t = TableData::default();
        t.set(&Value::Number(1.0), Value::from("one")).unwrap();
        assert_eq!(t.get(&Value::Int(1)), Value::from("one"));
        t.set(&Value::Number(1.5), Value::from("half")).unwrap();
        assert_eq!(t.get(&Value::Number(1.5)), Value::from("half"));
        assert_eq!(t.entry_count(), 2);
    }

    #[test]
    fn test_nil_and_nan_keys() {
        let mut t = TableData::default();
        assert_eq!(
            t.set(&Value::Nil, Value::Int(1)).unwrap_err().message(),
            "index is nil"
        );
        assert_eq!(
            t.set(&Value::Number(f64::NAN), Value::Int(1))
                .unwrap_err()
                .message(),
            "index is NaN"
        );
        assert!(t.get(&Value::Nil).is_nil());
    }

    #[test]
    fn test_nil_value_removes_entry() {
        let mut t = TableData::default();
        t.set(&Value::from("a"), Value::Int(1)).unwrap();
        assert_eq!(t.get_str("a"), Value::Int(1));
        t.set(&Value::from("a"), Value::Nil).unwrap();
        assert!(t.get_str("a").is_nil());
        assert_eq!(t.entry_count(), 0);
    }

    #[test]
    fn test_border() {
        let mut t = TableData::default();
        assert_eq!(t.border(), 0);
        for i in 1..=3 {
            t.set(&Value::Int(i), Value::Bool(true)).unwrap();
        }
        t.set(&Value::Int(5), Value::Bool(true)).unwrap();
        assert_eq!(t.border(), 3);

        // Recomputed on every call
        t.set(&Value::Int(4), Value::Bool(true)).unwrap();
        assert_eq!(t.border(), 5);
        t.set(&Value::Int(2), Value::Nil).unwrap();
        assert_eq!(t.border(), 1);
    }

    #[test]
    fn test_table_keys_by_identity() {
        let mut t = TableData::default();
        let k1 = TableRef::new(0, 0);
        let k2 = TableRef::new(0, 0);
        t.set(&Value::Table(k1.clone()), Value::Int(1)).unwrap();
        assert_eq!(t.get(&Value::Table(k1)), Value::Int(1));
        assert!(t.get(&Value::Table(k2)).is_nil());
    }
}

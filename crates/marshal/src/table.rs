//! Composite handles
//!
//! A [`Table`] names a table that lives in a stack slot. It does not own the
//! slot: dropping a handle never pops anything, and several handles may name
//! the same slot. Use [`TableGuard`] for scoped ownership of a slot.
//!
//! # Staleness
//!
//! A handle records the identity of its slot when it is bound. If the slot
//! is popped and reused, or shifted by an insert/remove/rotate below it, the
//! handle goes stale: every operation on it fails (returns `false`, `None`
//! or 0) and logs a warning instead of touching whatever now sits at the old
//! position. Re-acquire the table to rebind.
//!
//! ```text
//!   create_table        pop 1, push 7         get_field(...)
//!   ┌───────┐           ┌───────┐             -> false (stale)
//!   │ table │ ← handle  │   7   │ ← handle
//!   └───────┘           └───────┘
//! ```

use crate::marshal::{Convert, FieldKey, Push, take_top};
use crate::proxy::Proxy;
use crate::variant::Variant;
use slotbridge_core::{SlotId, State, TypeTag};
use std::fmt;
use std::ops::Deref;
use tracing::{debug, warn};

/// Non-owning handle to a table in a stack slot
#[derive(Clone, Copy)]
pub struct Table<'s> {
    state: &'s State,
    slot: Option<SlotId>,
}

impl<'s> Table<'s> {
    /// A handle bound to nothing; every operation on it fails
    pub fn unbound(state: &'s State) -> Self {
        Table { state, slot: None }
    }

    /// Push a new empty table and bind a handle to it
    ///
    /// The slot is not released automatically; pop it, or wrap the handle
    /// with [`Table::guard`].
    pub fn create(state: &'s State, narr: usize, nrec: usize) -> Self {
        state.create_table(narr, nrec);
        Table {
            state,
            slot: state.slot_id(-1),
        }
    }

    /// Bind to the table at `index`, if that slot holds a table
    pub fn bind(state: &'s State, index: i32) -> Option<Self> {
        if state.type_tag(index) != TypeTag::Table {
            return None;
        }
        Some(Table {
            state,
            slot: state.slot_id(index),
        })
    }

    pub fn state(&self) -> &'s State {
        self.state
    }

    /// Current position of the table, or 0 when unbound or stale
    pub fn index(&self) -> i32 {
        self.position().unwrap_or(0)
    }

    pub fn is_bound(&self) -> bool {
        self.slot.is_some()
    }

    /// True while the recorded slot is unchanged and still holds a table
    pub fn is_valid(&self) -> bool {
        self.position().is_some()
    }

    fn position(&self) -> Option<i32> {
        let index = self.state.index_of(self.slot?)?;
        (self.state.type_tag(index) == TypeTag::Table).then_some(index)
    }

    fn checked(&self, op: &'static str) -> Option<i32> {
        let position = self.position();
        if position.is_none() {
            warn!(op, bound = self.is_bound(), "table handle is stale or unbound");
        }
        position
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Store `value` under `key`
    ///
    /// Text keys use the named-field store; other keys are pushed and stored
    /// generically. Net stack effect is zero. Returns false, storing nothing,
    /// when this handle is stale, when the key or value refers to a stale
    /// handle, or when the runtime rejects the key (nil, NaN).
    pub fn set_field<K, V>(&self, key: &K, value: &V) -> bool
    where
        K: FieldKey + ?Sized,
        V: Push + ?Sized,
    {
        let Some(index) = self.checked("set_field") else {
            return false;
        };
        if !key.is_live() || !value.is_live() {
            warn!("set_field with a stale table handle as key or value");
            return false;
        }
        let stored = match key.field_name() {
            Some(name) => {
                value.push(self.state);
                self.state.set_field(index, name)
            }
            None => {
                key.push(self.state);
                value.push(self.state);
                self.state.set_table(index)
            }
        };
        match stored {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "set_field rejected");
                false
            }
        }
    }

    /// Read the value under `key` into `field`
    ///
    /// The fetched slot is popped afterwards unless the result refers to it
    /// (a nested [`Table`], or a [`Variant`] holding one). Returns false,
    /// leaving `field` untouched, when the handle is stale or the value does
    /// not convert; an absent key reads as nil.
    pub fn get_field<K, F>(&self, key: &K, field: &mut F) -> bool
    where
        K: FieldKey + ?Sized,
        F: Convert<'s>,
    {
        Self::store(self.fetch(key, false), field)
    }

    /// Like [`Table::get_field`], but the fetched slot always stays on the
    /// stack for the caller to manage
    pub fn get_field_keep<K, F>(&self, key: &K, field: &mut F) -> bool
    where
        K: FieldKey + ?Sized,
        F: Convert<'s>,
    {
        Self::store(self.fetch(key, true), field)
    }

    /// Read the value under `key`, returning None on failure
    pub fn get<F, K>(&self, key: &K) -> Option<F>
    where
        K: FieldKey + ?Sized,
        F: Convert<'s>,
    {
        self.fetch(key, false)
    }

    fn store<F>(fetched: Option<F>, field: &mut F) -> bool {
        match fetched {
            Some(value) => {
                *field = value;
                true
            }
            None => false,
        }
    }

    fn fetch<K, F>(&self, key: &K, keep: bool) -> Option<F>
    where
        K: FieldKey + ?Sized,
        F: Convert<'s>,
    {
        let index = self.checked("get_field")?;
        let fetched = match key.field_name() {
            Some(name) => self.state.get_field(index, name),
            None => {
                key.push(self.state);
                self.state.get_table(index)
            }
        };
        if let Err(err) = fetched {
            debug!(error = %err, "get_field rejected");
            if !keep {
                self.state.pop(1);
            }
            return None;
        }
        take_top(self.state, keep)
    }

    /// Length of the table (its border)
    ///
    /// Pushes one transient slot and pops it again. Stale handles report 0.
    pub fn len(&self) -> i64 {
        let Some(index) = self.checked("len") else {
            return 0;
        };
        if let Err(err) = self.state.length(index) {
            debug!(error = %err, "len rejected");
        }
        let length = self.state.to_integer(-1).unwrap_or(0);
        self.state.pop(1);
        length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-modify-write accessor for `key`
    ///
    /// Reads the current value immediately; see [`Proxy`].
    pub fn entry(&self, key: impl Into<Variant<'s>>) -> Proxy<'_, 's> {
        Proxy::new(self, key.into())
    }

    /// Take scoped ownership of the handle's slot
    pub fn guard(self) -> TableGuard<'s> {
        TableGuard {
            table: self,
            armed: true,
        }
    }
}

impl PartialEq for Table<'_> {
    /// Handles are equal when they name the same slot of the same state
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.state, other.state) && self.slot == other.slot
    }
}

impl fmt::Debug for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.slot, self.position()) {
            (None, _) => write!(f, "Table(unbound)"),
            (Some(_), Some(index)) => write!(f, "Table(@{})", index),
            (Some(_), None) => write!(f, "Table(stale)"),
        }
    }
}

impl Push for Table<'_> {
    /// Push a copy of the table reference; stale handles push nil
    fn push(&self, state: &State) {
        assert!(
            std::ptr::eq(self.state, state),
            "table handle pushed onto a different state"
        );
        match self.checked("push") {
            Some(index) => state.push_value(index),
            None => state.push_nil(),
        }
    }

    fn is_live(&self) -> bool {
        self.is_valid()
    }
}

impl<'s> Convert<'s> for Table<'s> {
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        Table::bind(state, index)
    }

    fn pins_slot(&self) -> bool {
        true
    }
}

impl FieldKey for Table<'_> {}

/// Scoped ownership of a table's stack slot
///
/// Dropping the guard removes the slot (a pop when it is on top, a remove
/// otherwise). Removing a slot below the top shifts, and so invalidates,
/// every handle above it. A guard whose handle has gone stale releases
/// nothing.
pub struct TableGuard<'s> {
    table: Table<'s>,
    armed: bool,
}

impl<'s> TableGuard<'s> {
    pub fn table(&self) -> Table<'s> {
        self.table
    }

    /// Give up ownership; the slot stays on the stack
    pub fn release(mut self) -> Table<'s> {
        self.armed = false;
        self.table
    }
}

impl<'s> Deref for TableGuard<'s> {
    type Target = Table<'s>;

    fn deref(&self) -> &Table<'s> {
        &self.table
    }
}

impl Drop for TableGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let state = self.table.state;
        match self.table.position() {
            Some(index) if index == state.top() => state.pop(1),
            Some(index) => state.remove(index),
            None => warn!("table guard dropped with a stale handle; slot not released"),
        }
    }
}

impl fmt::Debug for TableGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableGuard")
            .field("table", &self.table)
            .field("armed", &self.armed)
            .finish()
    }
}

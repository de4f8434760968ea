//! Keyed read-modify-write access
//!
//! `table.entry(key)` reads `table[key]` once and caches it. Assigning
//! through the proxy stores the new value and then reads it back, so the
//! cached value is always what the table actually holds afterwards.
//!
//! ```text
//!   let mut p = t.entry("a");   // get:        p.value() == "X"
//!   p.assign("Z");              // set, get:   p.value() == "Z"
//! ```
//!
//! A nested table read through a proxy keeps its slot on the stack, as
//! [`Table::get_field`] does.

use crate::table::Table;
use crate::variant::Variant;

/// Cached accessor for one key of one table
#[derive(Debug)]
pub struct Proxy<'t, 's> {
    table: &'t Table<'s>,
    key: Variant<'s>,
    value: Variant<'s>,
}

impl<'t, 's> Proxy<'t, 's> {
    pub(crate) fn new(table: &'t Table<'s>, key: Variant<'s>) -> Self {
        let mut proxy = Proxy {
            table,
            key,
            value: Variant::Unset,
        };
        proxy.refresh();
        proxy
    }

    /// Store `value` under the key, then re-read it
    ///
    /// Returns false when the store is rejected; the cached value then holds
    /// whatever the table still has.
    pub fn assign(&mut self, value: impl Into<Variant<'s>>) -> bool {
        let stored = self.table.set_field(&self.key, &value.into());
        self.refresh();
        stored
    }

    /// Re-read the key; the cache is left `Unset` when the read fails
    pub fn refresh(&mut self) -> bool {
        self.value = Variant::Unset;
        self.table.get_field(&self.key, &mut self.value)
    }

    /// The cached value, as of the last read
    pub fn value(&self) -> &Variant<'s> {
        &self.value
    }

    pub fn key(&self) -> &Variant<'s> {
        &self.key
    }

    pub fn table(&self) -> &'t Table<'s> {
        self.table
    }

    pub fn into_value(self) -> Variant<'s> {
        self.value
    }
}

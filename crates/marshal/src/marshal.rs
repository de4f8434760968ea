//! Scalar marshalling
//!
//! Two capability traits connect host types to stack slots:
//!
//! - [`Push`] writes exactly one slot on top of the stack
//! - [`Convert`] reads one slot without popping it
//!
//! Built-in implementations cover the fixed-width integers, floats, bools,
//! strings (text and raw bytes), native function pointers and the [`Nil`]
//! marker. `Option<T>`, [`Table`](crate::Table) and
//! [`Variant`](crate::Variant) implement them in their own modules.
//!
//! Integers and bools round-trip losslessly. Integer conversion is
//! range-checked, except `u64` and `usize`, which travel as the i64 bit
//! pattern so every value survives a push/convert round trip.

use slotbridge_core::{NativeFn, State, Str};

/// The runtime's "no value" marker
///
/// Push-only: absence is detected through `Option<T>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Nil;

/// A host value that can be pushed as one stack slot
pub trait Push {
    fn push(&self, state: &State);

    /// False when the value refers to a stack slot that is gone
    ///
    /// Such a value still pushes (as nil), but stores refuse it rather than
    /// silently writing nil over an existing entry.
    fn is_live(&self) -> bool {
        true
    }
}

/// A host value that can be read from a stack slot
///
/// `'s` is the lifetime of the [`State`]; handle types that keep referring
/// to the runtime borrow it for that long.
pub trait Convert<'s>: Sized {
    /// Read the slot at `index`; None when the slot does not hold a
    /// compatible value
    fn convert(state: &'s State, index: i32) -> Option<Self>;

    /// Whether this value refers to the slot it was read from
    ///
    /// Readers that normally pop the fetched slot leave it in place when
    /// this returns true.
    fn pins_slot(&self) -> bool {
        false
    }
}

/// A pushable value usable as a table key
///
/// Keys that are plain text report it through `field_name` and take the
/// named-field path; every other key is pushed and stored generically.
/// Both paths store the same entry.
pub trait FieldKey: Push {
    fn field_name(&self) -> Option<&str> {
        None
    }
}

/// Convert the slot at `index` into `out`
///
/// Returns false and leaves `out` untouched when the conversion fails.
pub fn convert<'s, T: Convert<'s>>(state: &'s State, index: i32, out: &mut T) -> bool {
    match T::convert(state, index) {
        Some(value) => {
            *out = value;
            true
        }
        None => false,
    }
}

/// Convert the top slot, then pop it unless the result pins it or `keep`
/// is set. A failed conversion pops too, unless `keep` is set.
pub(crate) fn take_top<'s, T: Convert<'s>>(state: &'s State, keep: bool) -> Option<T> {
    let converted = T::convert(state, -1);
    let pinned = converted.as_ref().is_some_and(|v| v.pins_slot());
    if !keep && !pinned {
        state.pop(1);
    }
    converted
}

impl<T: Push + ?Sized> Push for &T {
    fn push(&self, state: &State) {
        (**self).push(state)
    }

    fn is_live(&self) -> bool {
        (**self).is_live()
    }
}

impl<T: FieldKey + ?Sized> FieldKey for &T {
    fn field_name(&self) -> Option<&str> {
        (**self).field_name()
    }
}

// =============================================================================
// Integers
// =============================================================================

macro_rules! integer_marshal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Push for $ty {
                fn push(&self, state: &State) {
                    state.push_integer(i64::from(*self));
                }
            }

            impl<'s> Convert<'s> for $ty {
                fn convert(state: &'s State, index: i32) -> Option<Self> {
                    state.to_integer(index).and_then(|i| <$ty>::try_from(i).ok())
                }
            }

            impl FieldKey for $ty {}
        )*
    };
}

integer_marshal!(i8, i16, i32, i64, u8, u16, u32);

impl Push for isize {
    fn push(&self, state: &State) {
        state.push_integer(*self as i64);
    }
}

impl<'s> Convert<'s> for isize {
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        state.to_integer(index).and_then(|i| isize::try_from(i).ok())
    }
}

impl FieldKey for isize {}

macro_rules! bit_pattern_marshal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Push for $ty {
                fn push(&self, state: &State) {
                    state.push_integer(*self as i64);
                }
            }

            impl<'s> Convert<'s> for $ty {
                fn convert(state: &'s State, index: i32) -> Option<Self> {
                    state.to_integer(index).map(|i| i as $ty)
                }
            }

            impl FieldKey for $ty {}
        )*
    };
}

bit_pattern_marshal!(u64, usize);

// =============================================================================
// Floats
// =============================================================================

impl Push for f64 {
    fn push(&self, state: &State) {
        state.push_number(*self);
    }
}

impl<'s> Convert<'s> for f64 {
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        state.to_number(index)
    }
}

impl FieldKey for f64 {}

impl Push for f32 {
    fn push(&self, state: &State) {
        state.push_number(f64::from(*self));
    }
}

impl<'s> Convert<'s> for f32 {
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        state.to_number(index).map(|n| n as f32)
    }
}

impl FieldKey for f32 {}

// =============================================================================
// Booleans
// =============================================================================

impl Push for bool {
    fn push(&self, state: &State) {
        state.push_boolean(*self);
    }
}

impl<'s> Convert<'s> for bool {
    /// Never fails: nil and false read as false, everything else as true
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        Some(state.to_boolean(index))
    }
}

impl FieldKey for bool {}

// =============================================================================
// Strings
// =============================================================================

impl Push for str {
    fn push(&self, state: &State) {
        state.push_bytes(self.as_bytes());
    }
}

impl FieldKey for str {
    fn field_name(&self) -> Option<&str> {
        Some(self)
    }
}

impl Push for String {
    fn push(&self, state: &State) {
        state.push_bytes(self.as_bytes());
    }
}

impl<'s> Convert<'s> for String {
    /// Fails for non-UTF-8 contents; use `Vec<u8>` or `Str` for raw bytes
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        let s = state.to_str(index)?;
        String::from_utf8(s.as_bytes().to_vec()).ok()
    }
}

impl FieldKey for String {
    fn field_name(&self) -> Option<&str> {
        Some(self)
    }
}

impl Push for [u8] {
    fn push(&self, state: &State) {
        state.push_bytes(self);
    }
}

impl FieldKey for [u8] {}

impl Push for Vec<u8> {
    fn push(&self, state: &State) {
        state.push_bytes(self);
    }
}

impl<'s> Convert<'s> for Vec<u8> {
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        state.to_str(index).map(|s| s.as_bytes().to_vec())
    }
}

impl FieldKey for Vec<u8> {}

impl Push for Str {
    fn push(&self, state: &State) {
        state.push_str(self.clone());
    }
}

impl<'s> Convert<'s> for Str {
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        state.to_str(index)
    }
}

impl FieldKey for Str {
    fn field_name(&self) -> Option<&str> {
        self.to_str()
    }
}

// =============================================================================
// Functions and nil
// =============================================================================

impl Push for NativeFn {
    fn push(&self, state: &State) {
        state.push_function(*self);
    }
}

impl<'s> Convert<'s> for NativeFn {
    /// Only native functions convert; host closures and callable-looking
    /// values do not
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        state.to_function(index)
    }
}

impl FieldKey for NativeFn {}

impl Push for Nil {
    fn push(&self, state: &State) {
        state.push_nil();
    }
}

/// Always rejected by tables; accepted so the rejection is observable
impl FieldKey for Nil {}

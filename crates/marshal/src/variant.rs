//! Tagged values
//!
//! [`Variant`] holds any one value the bridge knows how to move: it is the
//! "any value" unit used for generic field access, proxies and dynamically
//! typed arguments. A `Table` case stores a non-owning handle, so a variant
//! never owns a stack slot either.
//!
//! Reading a variant through the accessor for a different case is a
//! programming error and panics. Use the `as_*` accessors when the case is
//! not known in advance.

use crate::marshal::{Convert, FieldKey, Nil, Push};
use crate::table::Table;
use slotbridge_core::number::format_float;
use slotbridge_core::{NativeFn, State, Str, TypeTag};
use std::fmt;

/// Any single value that can cross the stack
#[derive(Clone, Default)]
pub enum Variant<'s> {
    /// Holds nothing yet; pushes as nil
    #[default]
    Unset,
    Int(i64),
    Bool(bool),
    Number(f64),
    Str(Str),
    Function(NativeFn),
    Table(Table<'s>),
    Nil,
}

/// The case a [`Variant`] currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Unset,
    Int,
    Bool,
    Number,
    Str,
    Function,
    Table,
    Nil,
}

impl VariantKind {
    pub fn name(self) -> &'static str {
        match self {
            VariantKind::Unset => "unset",
            VariantKind::Int => "integer",
            VariantKind::Bool => "boolean",
            VariantKind::Number => "number",
            VariantKind::Str => "string",
            VariantKind::Function => "function",
            VariantKind::Table => "table",
            VariantKind::Nil => "nil",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<'s> Variant<'s> {
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Unset => VariantKind::Unset,
            Variant::Int(_) => VariantKind::Int,
            Variant::Bool(_) => VariantKind::Bool,
            Variant::Number(_) => VariantKind::Number,
            Variant::Str(_) => VariantKind::Str,
            Variant::Function(_) => VariantKind::Function,
            Variant::Table(_) => VariantKind::Table,
            Variant::Nil => VariantKind::Nil,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Variant::Unset)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    #[track_caller]
    fn mismatch(&self, wanted: VariantKind) -> ! {
        panic!(
            "variant accessor mismatch: wanted {}, holds {}",
            wanted,
            self.kind()
        )
    }

    // =========================================================================
    // Checked accessors (panic on the wrong case)
    // =========================================================================

    #[track_caller]
    pub fn to_integer(&self) -> i64 {
        match self {
            Variant::Int(i) => *i,
            _ => self.mismatch(VariantKind::Int),
        }
    }

    #[track_caller]
    pub fn to_boolean(&self) -> bool {
        match self {
            Variant::Bool(b) => *b,
            _ => self.mismatch(VariantKind::Bool),
        }
    }

    #[track_caller]
    pub fn to_number(&self) -> f64 {
        match self {
            Variant::Number(n) => *n,
            _ => self.mismatch(VariantKind::Number),
        }
    }

    #[track_caller]
    pub fn to_str(&self) -> &Str {
        match self {
            Variant::Str(s) => s,
            _ => self.mismatch(VariantKind::Str),
        }
    }

    #[track_caller]
    pub fn to_function(&self) -> NativeFn {
        match self {
            Variant::Function(f) => *f,
            _ => self.mismatch(VariantKind::Function),
        }
    }

    #[track_caller]
    pub fn to_table(&self) -> Table<'s> {
        match self {
            Variant::Table(t) => *t,
            _ => self.mismatch(VariantKind::Table),
        }
    }

    #[track_caller]
    pub fn to_nil(&self) -> Nil {
        match self {
            Variant::Nil => Nil,
            _ => self.mismatch(VariantKind::Nil),
        }
    }

    // =========================================================================
    // Optional accessors
    // =========================================================================

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Number or integer, widened to f64
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Variant::Number(n) => Some(*n),
            Variant::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&Str> {
        match self {
            Variant::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<NativeFn> {
        match self {
            Variant::Function(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<Table<'s>> {
        match self {
            Variant::Table(t) => Some(*t),
            _ => None,
        }
    }
}

// =============================================================================
// Construction
// =============================================================================

macro_rules! variant_from_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Variant<'_> {
                fn from(i: $ty) -> Self {
                    Variant::Int(i64::from(i))
                }
            }
        )*
    };
}

variant_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Variant<'_> {
    fn from(b: bool) -> Self {
        Variant::Bool(b)
    }
}

impl From<f64> for Variant<'_> {
    fn from(n: f64) -> Self {
        Variant::Number(n)
    }
}

impl From<f32> for Variant<'_> {
    fn from(n: f32) -> Self {
        Variant::Number(f64::from(n))
    }
}

impl From<&str> for Variant<'_> {
    fn from(s: &str) -> Self {
        Variant::Str(Str::from(s))
    }
}

impl From<String> for Variant<'_> {
    fn from(s: String) -> Self {
        Variant::Str(Str::from(s))
    }
}

impl From<&[u8]> for Variant<'_> {
    fn from(bytes: &[u8]) -> Self {
        Variant::Str(Str::from(bytes))
    }
}

impl From<Str> for Variant<'_> {
    fn from(s: Str) -> Self {
        Variant::Str(s)
    }
}

impl From<NativeFn> for Variant<'_> {
    fn from(f: NativeFn) -> Self {
        Variant::Function(f)
    }
}

impl<'s> From<Table<'s>> for Variant<'s> {
    fn from(t: Table<'s>) -> Self {
        Variant::Table(t)
    }
}

impl From<Nil> for Variant<'_> {
    fn from(_: Nil) -> Self {
        Variant::Nil
    }
}

impl<'s, T: Into<Variant<'s>>> From<Option<T>> for Variant<'s> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Variant::Nil, Into::into)
    }
}

// =============================================================================
// Comparison and formatting
// =============================================================================

impl PartialEq for Variant<'_> {
    /// Same case and same payload; functions compare by address, tables by
    /// the slot their handle names
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Unset, Variant::Unset) | (Variant::Nil, Variant::Nil) => true,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Number(a), Variant::Number(b)) => a == b,
            (Variant::Str(a), Variant::Str(b)) => a == b,
            (Variant::Function(a), Variant::Function(b)) => *a as usize == *b as usize,
            (Variant::Table(a), Variant::Table(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Variant<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Unset => write!(f, "Unset"),
            Variant::Int(i) => write!(f, "Int({})", i),
            Variant::Bool(b) => write!(f, "Bool({})", b),
            Variant::Number(n) => write!(f, "Number({})", n),
            Variant::Str(s) => write!(f, "Str({:?})", s.to_string_lossy()),
            Variant::Function(func) => write!(f, "Function(0x{:x})", *func as usize),
            Variant::Table(t) => write!(f, "{:?}", t),
            Variant::Nil => write!(f, "Nil"),
        }
    }
}

impl fmt::Display for Variant<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Unset => write!(f, "<unset>"),
            Variant::Int(i) => write!(f, "{}", i),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::Number(n) => f.write_str(&format_float(*n)),
            Variant::Str(s) => f.write_str(&s.to_string_lossy()),
            Variant::Function(func) => write!(f, "function: 0x{:x}", *func as usize),
            Variant::Table(t) if t.is_valid() => write!(f, "table@{}", t.index()),
            Variant::Table(_) => write!(f, "table@stale"),
            Variant::Nil => write!(f, "nil"),
        }
    }
}

// =============================================================================
// Marshalling
// =============================================================================

impl Push for Variant<'_> {
    fn push(&self, state: &State) {
        match self {
            Variant::Unset | Variant::Nil => state.push_nil(),
            Variant::Int(i) => state.push_integer(*i),
            Variant::Bool(b) => state.push_boolean(*b),
            Variant::Number(n) => state.push_number(*n),
            Variant::Str(s) => state.push_str(s.clone()),
            Variant::Function(f) => state.push_function(*f),
            Variant::Table(t) => t.push(state),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Variant::Table(t) => t.is_valid(),
            _ => true,
        }
    }
}

impl<'s> Convert<'s> for Variant<'s> {
    /// Read whatever the slot holds
    ///
    /// Fails only for host closures, which have no native pointer. Panics
    /// on an invalid position: callers must only convert live slots.
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        match state.type_tag(index) {
            TypeTag::Nil => Some(Variant::Nil),
            TypeTag::Boolean => Some(Variant::Bool(state.to_boolean(index))),
            TypeTag::Number if state.is_integer(index) => state.to_integer(index).map(Variant::Int),
            TypeTag::Number => state.to_number(index).map(Variant::Number),
            TypeTag::String => state.to_str(index).map(Variant::Str),
            TypeTag::Function => state.to_function(index).map(Variant::Function),
            TypeTag::Table => Table::bind(state, index).map(Variant::Table),
            TypeTag::None => panic!("variant conversion from invalid stack position {}", index),
        }
    }

    fn pins_slot(&self) -> bool {
        matches!(self, Variant::Table(_))
    }
}

impl FieldKey for Variant<'_> {
    fn field_name(&self) -> Option<&str> {
        match self {
            Variant::Str(s) => s.to_str(),
            _ => None,
        }
    }
}

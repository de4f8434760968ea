//! Runtime values
//!
//! `Value` is what a stack slot holds. Strings are immutable shared byte
//! strings; tables are shared, mutable and compared by identity. Host
//! callables come in two forms: plain native function pointers and boxed
//! closures.

use crate::error::RuntimeError;
use crate::state::State;
use crate::table::TableData;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// A native function callable through the protected call.
///
/// The function sees its own frame: position 1 is its first argument. It
/// returns how many values on top of its frame are results.
pub type NativeFn = fn(&State) -> Result<usize, RuntimeError>;

/// A host closure. Carries the "function" tag but is not a native function
/// pointer, so it never converts to [`NativeFn`].
pub type HostFn = Rc<dyn Fn(&State) -> Result<usize, RuntimeError>>;

/// Runtime type tag of a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Not a valid position
    None,
    Nil,
    Boolean,
    Number,
    String,
    Function,
    Table,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::None => "no value",
            TypeTag::Nil => "nil",
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Function => "function",
            TypeTag::Table => "table",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable, reference-counted, binary-safe byte string
///
/// Length-prefixed: embedded NUL bytes are ordinary content. Cloning shares
/// the underlying storage.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Str(Rc<[u8]>);

impl Str {
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        Str(Rc::from(bytes.as_ref()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The contents as UTF-8, if they are valid UTF-8
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Str::new(s)
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Str(Rc::from(s.into_bytes()))
    }
}

impl From<&[u8]> for Str {
    fn from(bytes: &[u8]) -> Self {
        Str::new(bytes)
    }
}

impl From<Vec<u8>> for Str {
    fn from(bytes: Vec<u8>) -> Self {
        Str(Rc::from(bytes))
    }
}

impl AsRef<[u8]> for Str {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a composite (table) value
///
/// Equality is identity: two references are equal when they point at the
/// same table.
///
/// Tables are reference counted, not garbage collected: a table that
/// stores itself (directly or through another table) forms a cycle and is
/// never freed.
#[derive(Clone)]
pub struct TableRef(Rc<RefCell<TableData>>);

impl TableRef {
    pub fn new(narr: usize, nrec: usize) -> Self {
        TableRef(Rc::new(RefCell::new(TableData::with_capacity(narr, nrec))))
    }

    pub fn borrow(&self) -> Ref<'_, TableData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, TableData> {
        self.0.borrow_mut()
    }

    /// Identity of the table (stable while any reference is alive)
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TableRef {}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: 0x{:x}", self.id())
    }
}

/// Value: what the embedded runtime talks about
///
/// Every stack slot, global and table entry holds one of these.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    /// Integer sub-kind of number
    Int(i64),
    /// Float sub-kind of number
    Number(f64),
    Str(Str),
    Function(NativeFn),
    Closure(HostFn),
    Table(TableRef),
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Nil => TypeTag::Nil,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Int(_) | Value::Number(_) => TypeTag::Number,
            Value::Str(_) => TypeTag::String,
            Value::Function(_) | Value::Closure(_) => TypeTag::Function,
            Value::Table(_) => TypeTag::Table,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_tag().name()
    }

    /// Only nil and false are falsey; zero, empty strings and tables are true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl PartialEq for Value {
    /// Raw equality: numbers compare by mathematical value, functions and
    /// tables by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Int(i), Value::Number(n)) | (Value::Number(n), Value::Int(i)) => {
                crate::number::float_to_integer(*n) == Some(*i)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => *a as usize == *b as usize,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Table(a), Value::Table(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Function(func) => write!(f, "Function(0x{:x})", *func as usize),
            Value::Closure(c) => write!(f, "Closure(0x{:x})", Rc::as_ptr(c) as *const () as usize),
            Value::Table(t) => write!(f, "Table({:?})", t),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Str::from(s))
    }
}

impl From<Str> for Value {
    fn from(s: Str) -> Self {
        Value::Str(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

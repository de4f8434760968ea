//! Slotbridge Core: the embedded stack VM behind slotbridge
//!
//! This crate is the runtime half of the bridge: a small, single-threaded,
//! dynamically-typed VM whose only channel to the host is a shared value
//! stack. It knows nothing about host types; `slotbridge` builds the typed
//! marshalling layer on top of the primitives exported here.
//!
//! Key design principles:
//! - Value: what the runtime talks about (Nil, Bool, Int, Number, Str, ...)
//! - TaggedStack: contiguous stamped slots, so cached positions can be
//!   checked for staleness
//! - State: index-addressed stack primitives, tables, globals, protected call
//!
//! # Modules
//!
//! - `error`: runtime errors and protected-call status codes
//! - `number`: string/number coercion rules
//! - `table`: composite storage and key normalisation
//! - `tagged_stack`: stamped slot array
//! - `value`: core Value enum and the types it carries
//! - `state`: the VM state and its stack API

pub mod error;
pub mod number;
pub mod state;
pub mod table;
pub mod tagged_stack;
pub mod value;

// Re-export key types and functions
pub use error::{RuntimeError, Status, format_panic_payload};
pub use state::{MULTRET, SlotId, State, StateConfig, host_fn};
pub use table::{Key, TableData};
pub use tagged_stack::TaggedStack;
pub use value::{HostFn, NativeFn, Str, TableRef, TypeTag, Value};

//! Slotbridge: typed marshalling between Rust and an embedded stack VM
//!
//! The runtime in `slotbridge-core` only speaks through its value stack.
//! This crate puts Rust types on both ends of that channel:
//!
//! - Push / Convert: one stack slot to and from a Rust value
//! - Option<T>: nil as `None`, distinct from a failed conversion
//! - Table: non-owning handle to a table slot, with staleness detection
//! - Variant: any one value, as a closed enum
//! - Proxy: cached read-modify-write access to one table key
//! - call_function: tuples of arguments in, tuples of typed results out
//!
//! ```
//! use slotbridge::{Env, Table};
//!
//! let env = Env::new();
//! {
//!     let person = env.create_table(0, 2);
//!     person.set_field("firstname", "Ada");
//!     env.set_global("person", &*person);
//! }
//!
//! let mut person = Table::unbound(env.state());
//! assert!(env.get_global("person", &mut person));
//! assert_eq!(person.get::<String, _>("firstname").as_deref(), Some("Ada"));
//! env.pop(1);
//! ```
//!
//! # Modules
//!
//! - `marshal`: scalar Push/Convert implementations and the `Nil` marker
//! - `optional`: `Option<T>` marshalling
//! - `table`: `Table` handles and `TableGuard`
//! - `variant`: the `Variant` tagged value
//! - `proxy`: `Proxy` keyed accessors
//! - `call`: argument/result tuples and `call_function`
//! - `config`: `EnvConfig` and its TOML loader
//! - `env`: `Env`, one runtime state with the typed API over it

pub mod call;
pub mod config;
pub mod env;
pub mod marshal;
pub mod optional;
pub mod proxy;
pub mod table;
pub mod variant;

// Re-export key types and functions
pub use call::{CallError, FromResults, PushArgs, call_function};
pub use config::{ConfigError, EnvConfig};
pub use env::Env;
pub use marshal::{Convert, FieldKey, Nil, Push, convert};
pub use proxy::Proxy;
pub use table::{Table, TableGuard};
pub use variant::{Variant, VariantKind};

// The runtime types that appear in this crate's signatures
pub use slotbridge_core::{MULTRET, NativeFn, RuntimeError, State, Status, Str, TypeTag};

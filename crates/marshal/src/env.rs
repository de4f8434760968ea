//! The environment: one runtime state plus the typed API over it
//!
//! [`Env`] owns a [`State`] and exposes the marshalling operations as
//! methods: typed globals, typed stack access, scoped table creation and
//! function calls. Handles and variants borrow the environment, so none of
//! them can outlive it.

use crate::call::{CallError, FromResults, PushArgs, call_function};
use crate::config::EnvConfig;
use crate::marshal::{Convert, Push, take_top};
use crate::table::{Table, TableGuard};
use slotbridge_core::{NativeFn, RuntimeError, State, host_fn};
use tracing::{debug, warn};

pub struct Env {
    state: State,
    config: EnvConfig,
}

impl Env {
    pub fn new() -> Self {
        Self::with_config(EnvConfig::default())
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self::with_config(EnvConfig::default().with_name(name))
    }

    pub fn with_config(config: EnvConfig) -> Self {
        debug!(name = %config.name, max_stack = config.max_stack, "creating environment");
        Env {
            state: State::with_config(config.to_state_config()),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// The underlying runtime, for primitives not wrapped here
    pub fn state(&self) -> &State {
        &self.state
    }

    // =========================================================================
    // Globals
    // =========================================================================

    /// Read the global `name` into `out`
    ///
    /// The fetched slot is popped unless the result refers to it (a
    /// [`Table`] stays bound to its slot). Returns false, leaving `out`
    /// untouched, when the value does not convert; an absent global reads
    /// as nil.
    pub fn get_global<'s, T: Convert<'s>>(&'s self, name: &str, out: &mut T) -> bool {
        match self.global(name) {
            Some(value) => {
                *out = value;
                true
            }
            None => false,
        }
    }

    /// Like [`Env::get_global`], but the fetched slot always stays on the
    /// stack
    pub fn get_global_keep<'s, T: Convert<'s>>(&'s self, name: &str, out: &mut T) -> bool {
        self.state.get_global(name);
        match take_top(&self.state, true) {
            Some(value) => {
                *out = value;
                true
            }
            None => false,
        }
    }

    /// Read the global `name`, or None when it does not convert
    pub fn global<'s, T: Convert<'s>>(&'s self, name: &str) -> Option<T> {
        self.state.get_global(name);
        take_top(&self.state, false)
    }

    /// Set the global `name`; nil (or `None`) removes it
    ///
    /// Returns false, leaving the global unchanged, when `value` refers to a
    /// stale table handle.
    pub fn set_global<V: Push + ?Sized>(&self, name: &str, value: &V) -> bool {
        if !value.is_live() {
            warn!(name, "set_global with a stale table handle");
            return false;
        }
        value.push(&self.state);
        self.state.set_global(name);
        true
    }

    /// Expose a native function as the global `name`
    pub fn register(&self, name: &str, f: NativeFn) {
        self.state.push_function(f);
        self.state.set_global(name);
    }

    /// Expose a Rust closure as the global `name`
    pub fn register_closure(
        &self,
        name: &str,
        f: impl Fn(&State) -> Result<usize, RuntimeError> + 'static,
    ) {
        self.state.push_closure(host_fn(f));
        self.state.set_global(name);
    }

    // =========================================================================
    // Stack
    // =========================================================================

    pub fn push<V: Push + ?Sized>(&self, value: &V) {
        value.push(&self.state);
    }

    /// Convert the slot at `index` without popping it
    pub fn to<'s, T: Convert<'s>>(&'s self, index: i32) -> Option<T> {
        T::convert(&self.state, index)
    }

    pub fn pop(&self, n: usize) {
        self.state.pop(n);
    }

    pub fn top(&self) -> i32 {
        self.state.top()
    }

    /// Number of slots in the current frame
    pub fn size(&self) -> usize {
        self.state.top() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn set_top(&self, index: i32) {
        self.state.set_top(index);
    }

    pub fn ensure_capacity(&self, n: usize) -> bool {
        self.state.ensure_capacity(n)
    }

    pub fn remove(&self, index: i32) {
        self.state.remove(index);
    }

    pub fn insert(&self, index: i32) {
        self.state.insert(index);
    }

    pub fn replace(&self, index: i32) {
        self.state.replace(index);
    }

    pub fn copy(&self, from: i32, to: i32) {
        self.state.copy(from, to);
    }

    pub fn rotate(&self, index: i32, n: i32) {
        self.state.rotate(index, n);
    }

    pub fn push_value(&self, index: i32) {
        self.state.push_value(index);
    }

    // =========================================================================
    // Tables and calls
    // =========================================================================

    /// Push a new table; the returned guard pops it when dropped
    pub fn create_table(&self, narr: usize, nrec: usize) -> TableGuard<'_> {
        Table::create(&self.state, narr, nrec).guard()
    }

    /// Call the global function `name` with no message handler, popping
    /// the results
    ///
    /// Popping releases the result slots, so a [`Table`] result comes back
    /// stale. Use [`Env::call_with`] with `pop` false to keep table results
    /// usable, then pop them yourself.
    pub fn call<'s, R, A>(&'s self, name: &str, args: A) -> Result<R, CallError>
    where
        R: FromResults<'s>,
        A: PushArgs,
    {
        call_function(&self.state, name, 0, true, args)
    }

    /// Call with an explicit message handler position and result popping
    pub fn call_with<'s, R, A>(
        &'s self,
        name: &str,
        msgh: i32,
        pop: bool,
        args: A,
    ) -> Result<R, CallError>
    where
        R: FromResults<'s>,
        A: PushArgs,
    {
        call_function(&self.state, name, msgh, pop, args)
    }

    /// Text of the error object at `index`, typically `-1` after a failed
    /// call
    pub fn error_message(&self, index: i32) -> Option<String> {
        self.state.to_str(index).map(|s| s.to_string_lossy())
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .finish()
    }
}

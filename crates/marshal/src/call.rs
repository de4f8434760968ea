//! Calling runtime functions with typed arguments and results
//!
//! [`call_function`] fetches a global function, pushes a tuple of arguments
//! left to right, runs a protected call, and converts the results back into
//! a tuple. Results are pushed in declaration order, so the k-th of n
//! declared results is read from position `-(n - k + 1)`.
//!
//! Result typing is strict: if any declared result fails to convert, the
//! whole call fails with [`CallError::ResultMismatch`], even though the
//! function itself ran. Use `Option<T>` for results that may be nil and
//! [`Variant`](crate::Variant) for results of unknown type.

use crate::marshal::{Convert, Push};
use slotbridge_core::{State, Status, TypeTag};
use std::fmt;
use tracing::{debug, trace};

/// Why a call through [`call_function`] failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The global does not hold a function; nothing was called
    NotAFunction(String),
    /// The protected call failed; its error object is left on the stack
    Call(Status),
    /// The call succeeded but the declared result at `position` (1-based)
    /// did not convert
    ResultMismatch { position: usize },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::NotAFunction(name) => write!(f, "global '{}' is not a function", name),
            CallError::Call(status) => write!(f, "call failed: {}", status),
            CallError::ResultMismatch { position } => {
                write!(f, "result {} has an unexpected type", position)
            }
        }
    }
}

impl std::error::Error for CallError {}

/// A fixed-size group of arguments pushed left to right
pub trait PushArgs {
    const COUNT: usize;

    fn push_args(&self, state: &State);
}

/// A fixed-size group of results read from the top of the stack
pub trait FromResults<'s>: Sized {
    const COUNT: usize;

    /// Convert the top `COUNT` slots without popping them; on failure,
    /// the 1-based position of the first result that did not convert
    fn from_results(state: &'s State) -> Result<Self, usize>;
}

impl PushArgs for () {
    const COUNT: usize = 0;

    fn push_args(&self, _state: &State) {}
}

impl<'s> FromResults<'s> for () {
    const COUNT: usize = 0;

    fn from_results(_state: &'s State) -> Result<Self, usize> {
        Ok(())
    }
}

macro_rules! tuple_marshal {
    ($count:literal; $($name:ident $idx:tt),+) => {
        impl<$($name: Push),+> PushArgs for ($($name,)+) {
            const COUNT: usize = $count;

            fn push_args(&self, state: &State) {
                $(self.$idx.push(state);)+
            }
        }

        impl<'s, $($name: Convert<'s>),+> FromResults<'s> for ($($name,)+) {
            const COUNT: usize = $count;

            fn from_results(state: &'s State) -> Result<Self, usize> {
                let first = -$count;
                Ok(($(
                    $name::convert(state, first + $idx).ok_or($idx + 1usize)?,
                )+))
            }
        }
    };
}

tuple_marshal!(1; A 0);
tuple_marshal!(2; A 0, B 1);
tuple_marshal!(3; A 0, B 1, C 2);
tuple_marshal!(4; A 0, B 1, C 2, D 3);
tuple_marshal!(5; A 0, B 1, C 2, D 3, E 4);
tuple_marshal!(6; A 0, B 1, C 2, D 3, E 4, F 5);
tuple_marshal!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
tuple_marshal!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Call the global function `name` with `args`
///
/// `msgh` is the stack position of a message handler, or 0 for none. With
/// `pop` set, the declared results are removed after conversion (also when
/// one of them failed to convert); otherwise they stay on the stack. A
/// [`Table`](crate::Table) result only names a live slot while it stays, so
/// pass `pop` false when reading tables and pop them when done.
///
/// On [`CallError::Call`] the callee and arguments have been replaced by a
/// single error object, which the caller must pop. The other errors leave
/// the stack as it was (except for unpopped results when `pop` is false).
pub fn call_function<'s, R, A>(
    state: &'s State,
    name: &str,
    msgh: i32,
    pop: bool,
    args: A,
) -> Result<R, CallError>
where
    R: FromResults<'s>,
    A: PushArgs,
{
    let msgh = if msgh == 0 { 0 } else { state.abs_index(msgh) };
    if !state.ensure_capacity(A::COUNT + 1) {
        debug!(name, "not enough stack for call");
        return Err(CallError::Call(Status::ErrMem));
    }

    let tag = state.get_global(name);
    if tag != TypeTag::Function {
        state.pop(1);
        debug!(name, found = %tag, "call target is not a function");
        return Err(CallError::NotAFunction(name.to_string()));
    }

    args.push_args(state);
    trace!(name, nargs = A::COUNT, nresults = R::COUNT, "calling");
    let status = state.pcall(A::COUNT, R::COUNT as i32, msgh);
    if !status.is_ok() {
        debug!(name, %status, "call failed");
        return Err(CallError::Call(status));
    }

    let results = R::from_results(state);
    if pop {
        state.pop(R::COUNT);
    }
    results.map_err(|position| {
        debug!(name, position, "result did not convert");
        CallError::ResultMismatch { position }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::Nil;
    use slotbridge_core::{RuntimeError, host_fn};

    fn add_one(state: &State) -> Result<usize, RuntimeError> {
        let n = state
            .to_integer(1)
            .ok_or_else(|| RuntimeError::new("add_one: expected an integer"))?;
        state.push_integer(n + 1);
        Ok(1)
    }

    fn fail(_: &State) -> Result<usize, RuntimeError> {
        Err(RuntimeError::new("boom"))
    }

    fn register(state: &State, name: &str, f: slotbridge_core::NativeFn) {
        state.push_function(f);
        state.set_global(name);
    }

    #[test]
    fn test_single_result() {
        let state = State::new();
        register(&state, "add_one", add_one);
        let (n,): (i64,) = call_function(&state, "add_one", 0, true, (41,)).unwrap();
        assert_eq!(n, 42);
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_results_keep_declaration_order() {
        let state = State::new();
        state.push_closure(host_fn(|s| {
            s.push_integer(1);
            s.push_integer(2);
            s.push_integer(3);
            Ok(3)
        }));
        state.set_global("three");
        let r: (i64, i64, i64) = call_function(&state, "three", 0, true, ()).unwrap();
        assert_eq!(r, (1, 2, 3));
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_missing_results_are_nil() {
        let state = State::new();
        register(&state, "add_one", add_one);
        let r: (i64, Option<String>) = call_function(&state, "add_one", 0, true, (1,)).unwrap();
        assert_eq!(r, (2, None));
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_not_a_function() {
        let state = State::new();
        state.push_integer(5);
        state.set_global("x");
        let r = call_function::<(), _>(&state, "x", 0, true, ());
        assert_eq!(r, Err(CallError::NotAFunction("x".into())));
        let r = call_function::<(), _>(&state, "missing", 0, true, ());
        assert!(matches!(r, Err(CallError::NotAFunction(_))));
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_call_error_leaves_error_object() {
        let state = State::new();
        register(&state, "fail", fail);
        let r = call_function::<(i64,), _>(&state, "fail", 0, true, (1, 2));
        assert_eq!(r, Err(CallError::Call(Status::ErrRun)));
        assert_eq!(state.top(), 1);
        assert_eq!(state.to_str(-1).unwrap().to_str(), Some("boom"));
    }

    #[test]
    fn test_message_handler() {
        let state = State::new();
        register(&state, "fail", fail);
        state.push_closure(host_fn(|s| {
            let msg = s.to_str(1).map(|m| m.to_string_lossy()).unwrap_or_default();
            s.push_bytes(format!("handled: {}", msg).as_bytes());
            Ok(1)
        }));
        let r = call_function::<(), _>(&state, "fail", -1, true, ());
        assert_eq!(r, Err(CallError::Call(Status::ErrRun)));
        assert_eq!(state.top(), 2);
        assert_eq!(state.to_str(-1).unwrap().to_str(), Some("handled: boom"));
    }

    #[test]
    fn test_result_mismatch_still_pops() {
        let state = State::new();
        state.push_closure(host_fn(|s| {
            s.push_integer(1);
            s.push_bytes(b"not a number");
            Ok(2)
        }));
        state.set_global("pair");
        let r = call_function::<(i64, i64), _>(&state, "pair", 0, true, ());
        assert_eq!(r, Err(CallError::ResultMismatch { position: 2 }));
        assert_eq!(state.top(), 0);

        let r = call_function::<(i64, i64), _>(&state, "pair", 0, false, ());
        assert!(r.is_err());
        assert_eq!(state.top(), 2);
    }

    #[test]
    fn test_results_without_pop_stay() {
        let state = State::new();
        register(&state, "add_one", add_one);
        let (n,): (i64,) = call_function(&state, "add_one", 0, false, (1,)).unwrap();
        assert_eq!(n, 2);
        assert_eq!(state.top(), 1);
        assert_eq!(state.to_integer(-1), Some(2));
    }

    #[test]
    fn test_arguments_pushed_left_to_right() {
        let state = State::new();
        state.push_closure(host_fn(|s| {
            let joined: Vec<String> = (1..=s.top())
                .map(|i| s.to_str(i).map(|v| v.to_string_lossy()).unwrap_or_else(|| "nil".into()))
                .collect();
            s.push_bytes(joined.join(",").as_bytes());
            Ok(1)
        }));
        state.set_global("join");
        let (s,): (String,) =
            call_function(&state, "join", 0, true, (1, "b", 2.5, Nil, None::<i64>)).unwrap();
        assert_eq!(s, "1,b,2.5,nil,nil");
    }

    #[test]
    fn test_capacity_exhausted() {
        let state = State::with_config(slotbridge_core::StateConfig {
            max_stack: 2,
            ..Default::default()
        });
        register(&state, "add_one", add_one);
        let r = call_function::<(), _>(&state, "add_one", 0, true, (1, 2, 3));
        assert_eq!(r, Err(CallError::Call(Status::ErrMem)));
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CallError::NotAFunction("f".into()).to_string(),
            "global 'f' is not a function"
        );
        assert_eq!(
            CallError::ResultMismatch { position: 3 }.to_string(),
            "result 3 has an unexpected type"
        );
    }
}

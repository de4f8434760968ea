//! Optional values
//!
//! `Option<T>` is the optional-value wrapper: `None` is the runtime's absent
//! value (nil) and `Some(v)` is a present value. Reading a nil slot into
//! `Option<T>` succeeds with `None`, so callers can tell "the field does not
//! exist" apart from "the field holds something of the wrong type", which
//! still fails.

use crate::marshal::{Convert, Push};
use slotbridge_core::{State, TypeTag};

impl<T: Push> Push for Option<T> {
    fn push(&self, state: &State) {
        match self {
            Some(value) => value.push(state),
            None => state.push_nil(),
        }
    }

    fn is_live(&self) -> bool {
        self.as_ref().is_none_or(|v| v.is_live())
    }
}

impl<'s, T: Convert<'s>> Convert<'s> for Option<T> {
    fn convert(state: &'s State, index: i32) -> Option<Self> {
        if state.type_tag(index) == TypeTag::Nil {
            return Some(None);
        }
        T::convert(state, index).map(Some)
    }

    fn pins_slot(&self) -> bool {
        self.as_ref().is_some_and(|v| v.pins_slot())
    }
}

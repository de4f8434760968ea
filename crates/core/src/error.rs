//! Runtime Error Handling
//!
//! Native functions report failure by returning a [`RuntimeError`] instead of
//! unwinding. The protected call turns that error (or a caught panic) into a
//! [`Status`] plus an error object left on the stack.
//!
//! # Usage
//!
//! ```ignore
//! fn divide(state: &State) -> Result<usize, RuntimeError> {
//!     let divisor = state.to_integer(2).ok_or_else(|| RuntimeError::new("bad divisor"))?;
//!     if divisor == 0 {
//!         return Err(RuntimeError::new("divide: division by zero"));
//!     }
//!     // ...
//! }
//! ```

use std::fmt;

/// Status code reported by a protected call
///
/// The numeric codes follow the conventional embedded-runtime numbering so
/// they can be logged or compared against foreign values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    ErrRun,
    ErrSyntax,
    ErrMem,
    ErrFile,
}

impl Status {
    /// Numeric status code
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::ErrRun => 2,
            Status::ErrSyntax => 3,
            Status::ErrMem => 4,
            Status::ErrFile => 6,
        }
    }

    /// Map a numeric code back to a status, if it is one we know
    pub fn from_code(code: i32) -> Option<Status> {
        match code {
            0 => Some(Status::Ok),
            2 => Some(Status::ErrRun),
            3 => Some(Status::ErrSyntax),
            4 => Some(Status::ErrMem),
            6 => Some(Status::ErrFile),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Ok => "ok",
            Status::ErrRun => "runtime error",
            Status::ErrSyntax => "syntax error",
            Status::ErrMem => "memory error",
            Status::ErrFile => "file error",
        };
        f.write_str(text)
    }
}

/// A runtime failure raised by a VM primitive or a native function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_message(self) -> String {
        self.message
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeError {}

impl From<String> for RuntimeError {
    fn from(message: String) -> Self {
        RuntimeError { message }
    }
}

impl From<&str> for RuntimeError {
    fn from(message: &str) -> Self {
        RuntimeError::new(message)
    }
}

/// Format a panic payload into an error message
pub fn format_panic_payload(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            Status::Ok,
            Status::ErrRun,
            Status::ErrSyntax,
            Status::ErrMem,
            Status::ErrFile,
        ] {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(1), None);
        assert!(Status::Ok.is_ok());
        assert!(!Status::ErrRun.is_ok());
    }

    #[test]
    fn test_runtime_error_message() {
        let err = RuntimeError::new("attempt to call a nil value");
        assert_eq!(err.message(), "attempt to call a nil value");
        assert_eq!(err.to_string(), "attempt to call a nil value");

        let err: RuntimeError = format!("bad argument #{}", 2).into();
        assert_eq!(err.into_message(), "bad argument #2");
    }

    #[test]
    fn test_format_panic_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("panic message");
        assert_eq!(format_panic_payload(&payload), "panic message");

        let payload: Box<dyn std::any::Any + Send> = Box::new("owned panic".to_string());
        assert_eq!(format_panic_payload(&payload), "owned panic");

        let payload: Box<dyn std::any::Any + Send> = Box::new(17u8);
        assert_eq!(format_panic_payload(&payload), "unknown panic");
    }
}

//! Error types and rejection reasons.
//!
//! Every rejection in the runtime carries a [`JsError`]. Arbitrary thrown
//! values are wrapped with [`ErrorKind::Thrown`] so that a reason can always
//! be turned back into the value that was thrown.

use std::fmt;

use crate::Value;

/// Result type used at every fallible seam of the runtime.
pub type JsResult<T> = Result<T, JsError>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An arbitrary value was thrown or used as a rejection reason
    Thrown,
    /// Type error (e.g., resuming a running coroutine)
    TypeError,
    /// Value out of allowed range
    RangeError,
    /// A promise was resolved with itself, directly or through a thenable cycle
    CircularResolution,
    /// Every input of an `any` combinator rejected
    AggregateFailure,
    /// A rejection nobody handled before the microtask queue drained
    UnhandledRejection,
    /// An error escaped a microtask or macrotask body
    TaskError,
    /// Internal runtime error
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Thrown => "Uncaught",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::CircularResolution => "CircularResolution",
            ErrorKind::AggregateFailure => "AggregateError",
            ErrorKind::UnhandledRejection => "UnhandledRejection",
            ErrorKind::TaskError => "TaskError",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// An error with a kind, a message and optional payloads.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, JsError};
///
/// let error = JsError::type_error("coroutine is already running");
/// assert_eq!(error.kind, ErrorKind::TypeError);
/// assert_eq!(error.to_string(), "TypeError: coroutine is already running");
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The thrown value, for [`ErrorKind::Thrown`] errors
    pub value: Option<Value>,
    /// Aggregated reasons, or the single cause of a task or rejection report
    pub errors: Vec<JsError>,
}

impl JsError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            value: None,
            errors: Vec::new(),
        }
    }

    /// Wraps an arbitrary value as a thrown error.
    pub fn thrown(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            kind: ErrorKind::Thrown,
            message: value.to_string(),
            value: Some(value),
            errors: Vec::new(),
        }
    }

    /// Creates a `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Creates a `RangeError`.
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, message)
    }

    /// Creates the error reported when a promise would resolve to itself.
    pub fn circular_resolution(promise_id: u64) -> Self {
        Self::new(
            ErrorKind::CircularResolution,
            format!("chaining cycle detected for promise #{}", promise_id),
        )
    }

    /// Creates an aggregate error carrying every rejection reason, in input order.
    pub fn aggregate(reasons: Vec<JsError>) -> Self {
        Self {
            kind: ErrorKind::AggregateFailure,
            message: format!("all {} promises were rejected", reasons.len()),
            value: None,
            errors: reasons,
        }
    }

    /// Wraps an error that escaped a task body.
    pub fn task_error(task: impl fmt::Display, cause: JsError) -> Self {
        Self {
            kind: ErrorKind::TaskError,
            message: format!("{} failed: {}", task, cause),
            value: None,
            errors: vec![cause],
        }
    }

    /// Wraps a rejection reason nobody handled.
    pub fn unhandled_rejection(promise_id: u64, reason: JsError) -> Self {
        Self {
            kind: ErrorKind::UnhandledRejection,
            message: format!("promise #{} rejected with {}", promise_id, reason),
            value: None,
            errors: vec![reason],
        }
    }

    /// Returns the underlying cause of a task error or rejection report.
    pub fn cause(&self) -> Option<&JsError> {
        match self.kind {
            ErrorKind::TaskError | ErrorKind::UnhandledRejection => self.errors.first(),
            _ => None,
        }
    }

    /// Returns the thrown value, if this error wraps one.
    pub fn thrown_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Converts a rejection reason into a value.
    ///
    /// A thrown value is returned as-is; any other error becomes
    /// [`Value::Error`].
    pub fn into_value(self) -> Value {
        match (self.kind, self.value) {
            (ErrorKind::Thrown, Some(value)) => value,
            (kind, value) => Value::Error(Box::new(JsError {
                kind,
                message: self.message,
                value,
                errors: self.errors,
            })),
        }
    }

    /// Converts a value into a rejection reason, inverting [`JsError::into_value`].
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Error(error) => *error,
            other => Self::thrown(other),
        }
    }
}

//! Core value types and error handling shared by the runtime components.
//!
//! This crate provides the foundational types for the cooperative scheduler,
//! including value representation, error types, and the thenable capability.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of dynamic values
//! - [`JsError`] - Errors and rejection reasons
//! - [`ErrorKind`] - Types of errors the runtime distinguishes
//! - [`Thenable`] - Capability interface for anything exposing `then`
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, JsError, Value};
//!
//! // Create values
//! let num = Value::Smi(42);
//! assert_eq!(num.to_string(), "42");
//!
//! // Throw an arbitrary value
//! let error = JsError::thrown("boom");
//! assert_eq!(error.kind, ErrorKind::Thrown);
//! assert_eq!(error.into_value(), Value::from("boom"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod thenable;
mod value;

pub use error::{ErrorKind, JsError, JsResult};
pub use thenable::{FulfillCallback, RejectCallback, Thenable};
pub use value::Value;

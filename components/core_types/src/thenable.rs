//! The thenable capability.
//!
//! Anything that can eventually produce a value or a rejection and lets
//! callers subscribe to that outcome is a thenable. Resolving a promise with
//! a [`Value::Thenable`] makes the promise adopt the thenable's outcome.

use std::any::Any;

use crate::{JsError, JsResult, Value};

/// Callback invoked with a fulfillment value.
pub type FulfillCallback = Box<dyn FnOnce(Value)>;

/// Callback invoked with a rejection reason.
pub type RejectCallback = Box<dyn FnOnce(JsError)>;

/// An object exposing a `then(on_fulfilled, on_rejected)` operation.
///
/// Implementations should invoke at most one of the callbacks, at most once.
/// The runtime guards against misbehaving implementations: only the first
/// invocation counts, and an error returned after a callback already fired
/// is ignored.
///
/// # Examples
///
/// ```
/// use core_types::{FulfillCallback, JsResult, RejectCallback, Thenable, Value};
/// use std::any::Any;
///
/// struct Ready(Value);
///
/// impl Thenable for Ready {
///     fn then(&self, on_fulfilled: FulfillCallback, _on_rejected: RejectCallback) -> JsResult<()> {
///         on_fulfilled(self.0.clone());
///         Ok(())
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// let value = Value::thenable(Ready(Value::Smi(1)));
/// assert!(value.as_thenable().is_some());
/// ```
pub trait Thenable {
    /// Subscribes to the eventual outcome.
    ///
    /// Returning an error before either callback fired rejects the adopting
    /// promise with that error.
    fn then(&self, on_fulfilled: FulfillCallback, on_rejected: RejectCallback) -> JsResult<()>;

    /// Exposes the concrete type so the runtime can recognise its own promises.
    fn as_any(&self) -> &dyn Any;
}

//! Dynamic value representation.
//!
//! This module provides the `Value` enum carried through promises, timers and
//! coroutines. Primitives are stored inline; thenables are shared by
//! reference and compare by identity.

use std::fmt;
use std::rc::Rc;

use crate::{JsError, Thenable};

/// Represents any value flowing through the runtime.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let undefined = Value::Undefined;
/// let number = Value::Smi(42);
/// let list = Value::List(vec![Value::from("a"), Value::from("b")]);
///
/// assert!(undefined.is_undefined());
/// assert_eq!(number.to_string(), "42");
/// assert_eq!(list.to_string(), "a,b");
/// ```
#[derive(Clone)]
pub enum Value {
    /// The undefined value
    Undefined,
    /// The null value
    Null,
    /// Boolean (true or false)
    Boolean(bool),
    /// Small integer
    Smi(i32),
    /// IEEE 754 double-precision floating point
    Double(f64),
    /// String value
    String(std::string::String),
    /// Ordered list of values
    List(Vec<Value>),
    /// Ordered record of named fields
    Object(Vec<(std::string::String, Value)>),
    /// An error carried as a first-class value
    Error(Box<JsError>),
    /// Anything exposing `then`, promises included
    Thenable(Rc<dyn Thenable>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::Smi(n) => f.debug_tuple("Smi").field(n).finish(),
            Value::Double(n) => f.debug_tuple("Double").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Object(fields) => f.debug_tuple("Object").field(fields).finish(),
            Value::Error(e) => f.debug_tuple("Error").field(e).finish(),
            Value::Thenable(_) => write!(f, "Thenable(...)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Smi(a), Value::Smi(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Thenable(a), Value::Thenable(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl Value {
    /// Wraps a thenable implementation.
    pub fn thenable(thenable: impl Thenable + 'static) -> Self {
        Value::Thenable(Rc::new(thenable))
    }

    /// Builds a record from `(name, value)` pairs, keeping their order.
    ///
    /// ```
    /// use core_types::Value;
    ///
    /// let record = Value::object([("status", Value::from("fulfilled"))]);
    /// assert_eq!(record.get("status"), Some(&Value::from("fulfilled")));
    /// ```
    pub fn object<K: Into<std::string::String>>(
        fields: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up a field of an [`Value::Object`].
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Returns the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the thenable, if this value exposes `then`.
    pub fn as_thenable(&self) -> Option<&Rc<dyn Thenable>> {
        match self {
            Value::Thenable(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true for [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<std::string::String> for Value {
    fn from(s: std::string::String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Smi(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<JsError> for Value {
    fn from(error: JsError) -> Self {
        error.into_value()
    }
}

/// String conversion.
///
/// - undefined → "undefined", null → "null"
/// - numbers → decimal representation
/// - lists → items joined with ","
/// - records → "[object Object]"
/// - errors → "Kind: message"
///
/// ```
/// use core_types::Value;
///
/// assert_eq!(Value::Double(2.0).to_string(), "2");
/// assert_eq!(Value::List(vec![Value::Smi(1), Value::Null]).to_string(), "1,null");
/// ```
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Smi(n) => write!(f, "{}", n),
            Value::Double(n) => {
                if n.is_nan() {
                    write!(f, "NaN")
                } else if n.is_infinite() {
                    if n.is_sign_positive() {
                        write!(f, "Infinity")
                    } else {
                        write!(f, "-Infinity")
                    }
                } else if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Error(e) => write!(f, "{}", e),
            Value::Thenable(_) => write!(f, "[object Promise]"),
        }
    }
}

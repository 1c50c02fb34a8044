//! Unit tests for the Thenable capability

use core_types::{FulfillCallback, JsError, JsResult, RejectCallback, Thenable, Value};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

struct Rejecting(&'static str);

impl Thenable for Rejecting {
    fn then(&self, _on_fulfilled: FulfillCallback, on_rejected: RejectCallback) -> JsResult<()> {
        on_rejected(JsError::thrown(self.0));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_thenable_values_compare_by_identity() {
    let a = Value::thenable(Rejecting("a"));
    let b = Value::thenable(Rejecting("a"));
    assert_eq!(a, a.clone());
    assert_ne!(a, b);
}

#[test]
fn test_thenable_can_be_downcast() {
    let value = Value::thenable(Rejecting("r"));
    let thenable = value.as_thenable().expect("thenable");
    assert!(thenable.as_any().downcast_ref::<Rejecting>().is_some());
}

#[test]
fn test_thenable_invokes_callback() {
    let seen = Rc::new(RefCell::new(None));
    let value = Value::thenable(Rejecting("nope"));
    let sink = seen.clone();
    value
        .as_thenable()
        .expect("thenable")
        .then(
            Box::new(|_| panic!("should not fulfil")),
            Box::new(move |e| *sink.borrow_mut() = Some(e)),
        )
        .unwrap();
    assert_eq!(seen.borrow().as_ref().and_then(|e| e.thrown_value()), Some(&Value::from("nope")));
}

#[test]
fn test_thenable_displays_as_promise() {
    assert_eq!(Value::thenable(Rejecting("x")).to_string(), "[object Promise]");
}

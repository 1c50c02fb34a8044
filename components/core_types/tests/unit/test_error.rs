//! Unit tests for JsError and ErrorKind

use core_types::{ErrorKind, JsError, Value};

#[cfg(test)]
mod error_kind_tests {
    use super::*;

    #[test]
    fn test_error_kind_display_names() {
        assert_eq!(ErrorKind::TypeError.to_string(), "TypeError");
        assert_eq!(ErrorKind::CircularResolution.to_string(), "CircularResolution");
        assert_eq!(ErrorKind::UnhandledRejection.to_string(), "UnhandledRejection");
        assert_eq!(ErrorKind::TaskError.to_string(), "TaskError");
    }

    #[test]
    fn test_error_kind_is_copy() {
        let kind = ErrorKind::RangeError;
        let copy = kind;
        assert_eq!(kind, copy);
    }
}

#[cfg(test)]
mod js_error_tests {
    use super::*;

    #[test]
    fn test_new_has_no_payloads() {
        let error = JsError::new(ErrorKind::InternalError, "oops");
        assert_eq!(error.message, "oops");
        assert!(error.value.is_none());
        assert!(error.errors.is_empty());
    }

    #[test]
    fn test_thrown_keeps_value() {
        let error = JsError::thrown("x");
        assert_eq!(error.kind, ErrorKind::Thrown);
        assert_eq!(error.thrown_value(), Some(&Value::from("x")));
        assert_eq!(error.to_string(), "Uncaught: x");
    }

    #[test]
    fn test_aggregate_keeps_reasons_in_order() {
        let error = JsError::aggregate(vec![JsError::thrown("e1"), JsError::thrown("e2")]);
        assert_eq!(error.kind, ErrorKind::AggregateFailure);
        assert_eq!(error.errors.len(), 2);
        assert_eq!(error.errors[0].thrown_value(), Some(&Value::from("e1")));
        assert_eq!(error.errors[1].thrown_value(), Some(&Value::from("e2")));
    }

    #[test]
    fn test_aggregate_with_no_reasons() {
        let error = JsError::aggregate(vec![]);
        assert!(error.errors.is_empty());
        assert_eq!(error.message, "all 0 promises were rejected");
    }

    #[test]
    fn test_unhandled_rejection_cause() {
        let error = JsError::unhandled_rejection(4, JsError::thrown(Value::Smi(1)));
        assert_eq!(error.kind, ErrorKind::UnhandledRejection);
        assert_eq!(error.cause().and_then(|c| c.thrown_value()), Some(&Value::Smi(1)));
    }

    #[test]
    fn test_cause_is_none_for_plain_errors() {
        assert!(JsError::type_error("t").cause().is_none());
    }

    #[test]
    fn test_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&JsError::range_error("r"));
    }

    #[test]
    fn test_into_value_for_non_thrown_error() {
        let value = JsError::type_error("bad").into_value();
        match value {
            Value::Error(inner) => assert_eq!(inner.kind, ErrorKind::TypeError),
            other => panic!("expected error value, got {:?}", other),
        }
    }

    #[test]
    fn test_from_value_of_plain_value_is_thrown() {
        let error = JsError::from_value(Value::Null);
        assert_eq!(error.kind, ErrorKind::Thrown);
        assert_eq!(error.thrown_value(), Some(&Value::Null));
    }
}

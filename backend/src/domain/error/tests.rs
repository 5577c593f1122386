//! Tests for the error envelope constructors and serde contract.

use super::*;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn detailed_error() -> Error {
    Error::invalid_request("bad").with_details(json!({"errors": {"0.email": ["unique"]}}))
}

#[rstest]
#[case(Error::invalid_request("bad"), ErrorCode::InvalidRequest)]
#[case(Error::not_found("gone"), ErrorCode::NotFound)]
#[case(Error::conflict("taken"), ErrorCode::Conflict)]
#[case(Error::service_unavailable("down"), ErrorCode::ServiceUnavailable)]
#[case(Error::internal("boom"), ErrorCode::InternalError)]
fn constructors_set_code(#[case] error: Error, #[case] expected: ErrorCode) {
    assert_eq!(error.code(), expected);
    assert!(error.details().is_none());
}

#[rstest]
fn try_new_rejects_empty_messages() {
    let result = Error::try_new(ErrorCode::InvalidRequest, "   ");
    assert!(matches!(result, Err(ErrorValidationError::EmptyMessage)));
}

#[rstest]
#[should_panic(expected = "error messages must satisfy validation")]
fn new_panics_on_blank_message() {
    let _ = Error::new(ErrorCode::InternalError, "");
}

#[rstest]
fn display_uses_message(detailed_error: Error) {
    assert_eq!(detailed_error.to_string(), "bad");
}

#[rstest]
fn serialises_code_in_snake_case(detailed_error: Error) {
    let value = serde_json::to_value(&detailed_error).expect("serialise error");
    assert_eq!(value["code"], json!("invalid_request"));
    assert_eq!(value["details"]["errors"]["0.email"], json!(["unique"]));
}

#[rstest]
fn omits_absent_details() {
    let value = serde_json::to_value(Error::conflict("taken")).expect("serialise error");
    assert!(value.get("details").is_none());
    assert_eq!(value["code"], json!("conflict"));
}

#[rstest]
fn deserialising_validates_message() {
    let result = serde_json::from_value::<Error>(json!({
        "code": "internal_error",
        "message": "  "
    }));
    assert!(result.is_err());
}

#[rstest]
fn deserialising_rejects_unknown_fields() {
    let result = serde_json::from_value::<Error>(json!({
        "code": "not_found",
        "message": "gone",
        "traceId": "abc"
    }));
    assert!(result.is_err());
}

#[rstest]
fn round_trips_with_details(detailed_error: Error) {
    let value = serde_json::to_value(&detailed_error).expect("serialise error");
    let decoded: Error = serde_json::from_value(value).expect("deserialise error");
    assert_eq!(decoded, detailed_error);
}

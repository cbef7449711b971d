//! Test assertions for step results.

use serde_json::Value;

use crate::core::{StepResult, StepStatus};

fn parse(value: &Value) -> StepResult {
    match StepResult::from_value(value) {
        Some(result) => result,
        None => panic!("Expected a step result, got {value}"),
    }
}

/// Asserts that `value` is a successful step result.
pub fn assert_step_succeeded(value: &Value) {
    let result = parse(value);
    assert!(
        result.is_success(),
        "Expected success, got error: {:?}",
        result.error
    );
}

/// Asserts that `value` is a failed step result and returns its error.
pub fn assert_step_failed(value: &Value) -> String {
    let result = parse(value);
    assert_eq!(
        result.status,
        StepStatus::Failed,
        "Expected failure, got {value}"
    );
    result.error.unwrap_or_default()
}

/// Asserts that the result object has exactly `keys`.
pub fn assert_result_keys(result: &serde_json::Map<String, Value>, keys: &[&str]) {
    let mut actual: Vec<&str> = result.keys().map(String::as_str).collect();
    actual.sort_unstable();
    let mut expected = keys.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Unexpected result keys");
}

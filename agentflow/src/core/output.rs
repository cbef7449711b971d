//! Step result record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StepStatus;

/// The structured record every step produces.
///
/// Serialises flat: `{"status": "success", "model": "m", "output_text": "hi"}`.
/// A failed result carries an `error` string and its payload fields set to
/// `null`, so consumers see the same keys on both paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Whether the step succeeded.
    pub status: StepStatus,

    /// Domain payload fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,

    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// Creates a successful result with no payload.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: StepStatus::Success,
            payload: Map::new(),
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            payload: Map::new(),
            error: Some(error.into()),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Adds `null` payload fields, used on the failure path.
    #[must_use]
    pub fn with_null_fields(mut self, keys: &[&str]) -> Self {
        for key in keys {
            self.payload.entry((*key).to_string()).or_insert(Value::Null);
        }
        self
    }

    /// Returns true if the step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Gets a payload field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Converts the record to a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.payload.len() + 2);
        map.insert("status".to_string(), Value::String(self.status.to_string()));
        for (key, value) in &self.payload {
            map.insert(key.clone(), value.clone());
        }
        if let Some(ref error) = self.error {
            map.insert("error".to_string(), Value::String(error.clone()));
        }
        Value::Object(map)
    }

    /// Reads a record back out of state, if the value has the right shape.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl From<StepResult> for Value {
    fn from(result: StepResult) -> Self {
        result.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let result = StepResult::success()
            .with_field("model", "m1")
            .with_field("output_text", "ok");

        assert!(result.is_success());
        assert_eq!(
            result.to_value(),
            json!({"status": "success", "model": "m1", "output_text": "ok"})
        );
    }

    #[test]
    fn test_failed_shape() {
        let result = StepResult::failed("boom")
            .with_field("model", "m1")
            .with_null_fields(&["model", "output_text"]);

        assert!(!result.is_success());
        assert_eq!(
            result.to_value(),
            json!({"status": "failed", "model": "m1", "output_text": null, "error": "boom"})
        );
    }

    #[test]
    fn test_serde_matches_to_value() {
        let result = StepResult::success().with_field("write_id", 7);
        assert_eq!(serde_json::to_value(&result).unwrap(), result.to_value());
    }

    #[test]
    fn test_from_value() {
        let parsed = StepResult::from_value(&json!({
            "status": "failed",
            "tool_name": "echo",
            "error": "nope"
        }))
        .unwrap();

        assert_eq!(parsed.error.as_deref(), Some("nope"));
        assert_eq!(parsed.get("tool_name"), Some(&json!("echo")));
        assert!(StepResult::from_value(&json!({"no_status": true})).is_none());
    }
}

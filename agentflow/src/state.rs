//! Shared state threaded through every pipeline step.
//!
//! The container is a JSON object. Steps read the fields they need and return
//! a [`StateUpdate`] holding their own namespaced key. Once a step has written
//! a key during a run, that key is sealed; later writes to it are rejected.
//! `result` is exempt, as the terminal step owns it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::core::StepName;
use crate::errors::OutputConflictError;

/// Vector inserted by the `milvus` step when the state supplies none.
pub const DEFAULT_VECTOR: [f64; 3] = [0.1, 0.2, 0.3];

/// Query used by the `mem0` step when the state supplies none.
pub const DEFAULT_MEM0_QUERY: &str = "What did the user say?";

/// Well-known state keys.
pub mod keys {
    /// User prompt.
    pub const PROMPT: &str = "prompt";
    /// mem0 search query.
    pub const MEM0_QUERY: &str = "mem0_query";
    /// Vector to insert.
    pub const MILVUS_VECTOR: &str = "milvus_vector";
    /// Vector to search with.
    pub const MILVUS_QUERY_VECTOR: &str = "milvus_query_vector";
    /// Tool arguments.
    pub const MCP_TOOL_ARGS: &str = "mcp_tool_args";
    /// Aggregated result.
    pub const RESULT: &str = "result";
}

/// A partial update returned by a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateUpdate(Map<String, Value>);

impl StateUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an update with a single key.
    #[must_use]
    pub fn single(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with(key, value)
    }

    /// Adds a key to the update.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Gets a value from the update.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if the update is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for StateUpdate {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl IntoIterator for StateUpdate {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Keys written by a merge, plus any that were rejected.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Keys applied to the state.
    pub applied: Vec<String>,
    /// Writes rejected because the key was sealed.
    pub conflicts: Vec<OutputConflictError>,
}

/// The state container for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(flatten)]
    values: Map<String, Value>,
    #[serde(skip)]
    sealed: BTreeSet<String>,
}

impl AgentState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state seeded with caller-supplied fields.
    #[must_use]
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values,
            sealed: BTreeSet::new(),
        }
    }

    /// Sets a field directly, bypassing sealing. Used for seeding only.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Gets a raw field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Consumes the state into a JSON object.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }

    /// Returns a JSON snapshot of the current fields.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Fills in fields from an earlier snapshot without overriding existing ones.
    pub fn seed_from(&mut self, previous: Map<String, Value>) {
        for (key, value) in previous {
            self.values.entry(key).or_insert(value);
        }
    }

    /// Merges a step's update into the state.
    ///
    /// Keys written by an earlier step in this run are left untouched and
    /// reported as conflicts.
    pub fn merge(&mut self, step: StepName, update: StateUpdate) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for (key, value) in update {
            if key != keys::RESULT && self.sealed.contains(&key) {
                outcome
                    .conflicts
                    .push(OutputConflictError::new(step.as_str(), key));
                continue;
            }
            self.sealed.insert(key.clone());
            self.values.insert(key.clone(), value);
            outcome.applied.push(key);
        }

        outcome
    }

    /// Returns the prompt, or an empty string.
    #[must_use]
    pub fn prompt(&self) -> &str {
        self.str_field(keys::PROMPT).unwrap_or("")
    }

    /// Returns the mem0 query, or the default question.
    #[must_use]
    pub fn mem0_query(&self) -> &str {
        self.str_field(keys::MEM0_QUERY).unwrap_or(DEFAULT_MEM0_QUERY)
    }

    /// Returns the content the `mem0` step should store.
    ///
    /// The `llm` step's `output_text` wins when present and non-empty;
    /// otherwise the prompt is used.
    #[must_use]
    pub fn mem0_content(&self) -> &str {
        self.get(StepName::Llm.output_key())
            .and_then(|llm| llm.get("output_text"))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| self.prompt())
    }

    /// Returns the vector to insert, or [`DEFAULT_VECTOR`].
    #[must_use]
    pub fn milvus_vector(&self) -> Vec<f64> {
        self.vector_field(keys::MILVUS_VECTOR)
            .unwrap_or_else(|| DEFAULT_VECTOR.to_vec())
    }

    /// Returns the explicit search vector, if one was supplied.
    #[must_use]
    pub fn milvus_query_vector(&self) -> Option<Vec<f64>> {
        self.vector_field(keys::MILVUS_QUERY_VECTOR)
            .filter(|v| !v.is_empty())
    }

    /// Returns the tool arguments, or an empty object.
    #[must_use]
    pub fn mcp_tool_args(&self) -> Map<String, Value> {
        self.get(keys::MCP_TOOL_ARGS)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns a step's recorded output.
    #[must_use]
    pub fn step_output(&self, step: StepName) -> Option<&Value> {
        self.get(step.output_key())
    }

    /// Returns the aggregated result.
    #[must_use]
    pub fn result(&self) -> Option<&Map<String, Value>> {
        self.get(keys::RESULT).and_then(Value::as_object)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn vector_field(&self, key: &str) -> Option<Vec<f64>> {
        self.get(key)?
            .as_array()?
            .iter()
            .map(Value::as_f64)
            .collect()
    }
}

impl From<Map<String, Value>> for AgentState {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state(value: Value) -> AgentState {
        match value {
            Value::Object(map) => AgentState::from_map(map),
            _ => panic!("state must be an object"),
        }
    }

    #[test]
    fn test_mem0_content_falls_back_to_prompt() {
        let s = state(json!({"prompt": "hi"}));
        assert_eq!(s.mem0_content(), "hi");
    }

    #[test]
    fn test_mem0_content_prefers_llm_output() {
        let s = state(json!({"prompt": "hi", "llm": {"output_text": "answer"}}));
        assert_eq!(s.mem0_content(), "answer");
    }

    #[test]
    fn test_mem0_content_ignores_empty_or_null_llm_output() {
        let s = state(json!({"prompt": "hi", "llm": {"output_text": ""}}));
        assert_eq!(s.mem0_content(), "hi");

        let s = state(json!({"prompt": "hi", "llm": {"status": "failed", "output_text": null}}));
        assert_eq!(s.mem0_content(), "hi");

        assert_eq!(AgentState::new().mem0_content(), "");
    }

    #[test]
    fn test_mem0_query_default() {
        assert_eq!(AgentState::new().mem0_query(), DEFAULT_MEM0_QUERY);
        let s = state(json!({"mem0_query": "what was said?"}));
        assert_eq!(s.mem0_query(), "what was said?");
    }

    #[test]
    fn test_milvus_vector_defaults() {
        let s = AgentState::new();
        assert_eq!(s.milvus_vector(), vec![0.1, 0.2, 0.3]);
        assert_eq!(s.milvus_query_vector(), None);

        let s = state(json!({"milvus_vector": [1.0, 2.0], "milvus_query_vector": [0.9, 0.1]}));
        assert_eq!(s.milvus_vector(), vec![1.0, 2.0]);
        assert_eq!(s.milvus_query_vector(), Some(vec![0.9, 0.1]));
    }

    #[test]
    fn test_malformed_vector_uses_default() {
        let s = state(json!({"milvus_vector": ["a", "b"]}));
        assert_eq!(s.milvus_vector(), DEFAULT_VECTOR.to_vec());
    }

    #[test]
    fn test_mcp_tool_args_default_empty() {
        assert!(AgentState::new().mcp_tool_args().is_empty());
        let s = state(json!({"mcp_tool_args": {"text": "hi"}}));
        assert_eq!(s.mcp_tool_args().get("text"), Some(&json!("hi")));
    }

    #[test]
    fn test_merge_seals_step_outputs() {
        let mut s = state(json!({"prompt": "hi"}));

        let first = s.merge(StepName::Llm, StateUpdate::single("llm", json!({"status": "success"})));
        assert_eq!(first.applied, vec!["llm"]);
        assert!(first.conflicts.is_empty());

        let second = s.merge(StepName::Mem0, StateUpdate::single("llm", json!({"status": "failed"})));
        assert!(second.applied.is_empty());
        assert_eq!(second.conflicts.len(), 1);
        assert_eq!(s.get("llm"), Some(&json!({"status": "success"})));
    }

    #[test]
    fn test_seeded_fields_are_not_sealed() {
        let mut s = state(json!({"llm": {"status": "stale"}}));
        let outcome = s.merge(StepName::Llm, StateUpdate::single("llm", json!({"status": "success"})));
        assert!(outcome.conflicts.is_empty());
        assert_eq!(s.get("llm"), Some(&json!({"status": "success"})));
    }

    #[test]
    fn test_seed_from_keeps_caller_fields() {
        let mut s = state(json!({"prompt": "new"}));
        let previous = json!({"prompt": "old", "mem0_query": "q"});
        s.seed_from(previous.as_object().unwrap().clone());

        assert_eq!(s.prompt(), "new");
        assert_eq!(s.mem0_query(), "q");
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let s = state(json!({"prompt": "hi"}));
        assert_eq!(serde_json::to_value(&s).unwrap(), json!({"prompt": "hi"}));
    }
}

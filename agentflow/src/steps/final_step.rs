//! Default `final` step: aggregates the step outputs into `result`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::Step;
use crate::core::StepName;
use crate::state::{AgentState, StateUpdate};

/// Copies each domain step's output into `result`, `null` where absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalStep;

impl FinalStep {
    /// Builds the aggregate from `state`.
    #[must_use]
    pub fn aggregate(state: &AgentState) -> Map<String, Value> {
        StepName::DOMAIN
            .iter()
            .map(|step| {
                let output = state.step_output(*step).cloned().unwrap_or(Value::Null);
                (step.output_key().to_string(), output)
            })
            .collect()
    }
}

#[async_trait]
impl Step for FinalStep {
    fn name(&self) -> &str {
        StepName::Final.as_str()
    }

    async fn execute(&self, state: &AgentState) -> StateUpdate {
        StateUpdate::single(StepName::Final.output_key(), Self::aggregate(state))
    }
}

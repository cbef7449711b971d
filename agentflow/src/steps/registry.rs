//! Step resolution.
//!
//! Callers may replace any step by name. Resolution happens once when a
//! pipeline is built; a step without an override gets its default.

use std::collections::HashMap;
use std::sync::Arc;

use super::{FinalStep, LlmStep, McpStep, Mem0Step, MilvusStep, Step};
use crate::clients::StepClients;
use crate::config::AppConfig;
use crate::core::StepName;
use crate::errors::{ClientError, ConfigError};

/// Caller-supplied step substitutes.
#[derive(Debug, Clone, Default)]
pub struct StepOverrides {
    steps: HashMap<StepName, Arc<dyn Step>>,
}

impl StepOverrides {
    /// Creates an empty override set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `name` with `step`.
    pub fn insert(&mut self, name: StepName, step: Arc<dyn Step>) -> &mut Self {
        self.steps.insert(name, step);
        self
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: StepName, step: Arc<dyn Step>) -> Self {
        self.insert(name, step);
        self
    }

    /// Replaces the step called `name`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownStep`] if `name` is not a pipeline step.
    pub fn insert_named(&mut self, name: &str, step: Arc<dyn Step>) -> Result<&mut Self, ConfigError> {
        let name: StepName = name.parse()?;
        Ok(self.insert(name, step))
    }

    /// Returns the override for `name`.
    #[must_use]
    pub fn get(&self, name: StepName) -> Option<&Arc<dyn Step>> {
        self.steps.get(&name)
    }

    /// Returns true if `name` is overridden.
    #[must_use]
    pub fn contains(&self, name: StepName) -> bool {
        self.steps.contains_key(&name)
    }

    /// Returns true if all four domain steps are overridden.
    #[must_use]
    pub fn covers_domain(&self) -> bool {
        StepName::DOMAIN.iter().all(|s| self.contains(*s))
    }

    /// Returns the number of overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if nothing is overridden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// The resolved implementation for every step, in pipeline order.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<(StepName, Arc<dyn Step>)>,
}

impl StepRegistry {
    /// Resolves every step, building default clients only for the domain
    /// steps that are not overridden.
    ///
    /// # Errors
    ///
    /// Returns an error if a needed default client cannot be constructed.
    pub fn build(config: &AppConfig, overrides: &StepOverrides) -> Result<Self, ClientError> {
        let clients = if overrides.covers_domain() {
            None
        } else {
            Some(StepClients::from_config(config)?)
        };
        Ok(Self::resolve_all(config, overrides, clients.as_ref()))
    }

    /// Resolves every step against explicit clients.
    #[must_use]
    pub fn with_clients(config: &AppConfig, overrides: &StepOverrides, clients: &StepClients) -> Self {
        Self::resolve_all(config, overrides, Some(clients))
    }

    fn resolve_all(
        config: &AppConfig,
        overrides: &StepOverrides,
        clients: Option<&StepClients>,
    ) -> Self {
        let steps = StepName::ALL
            .iter()
            .filter_map(|&name| {
                let step = match overrides.get(name) {
                    Some(step) => Arc::clone(step),
                    None => default_step(name, config, clients)?,
                };
                Some((name, step))
            })
            .collect();
        Self { steps }
    }

    /// Returns the implementation resolved for `name`.
    #[must_use]
    pub fn resolve(&self, name: StepName) -> Option<&Arc<dyn Step>> {
        self.steps.iter().find(|(n, _)| *n == name).map(|(_, s)| s)
    }

    /// Iterates the steps in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (StepName, &Arc<dyn Step>)> {
        self.steps.iter().map(|(n, s)| (*n, s))
    }
}

fn default_step(
    name: StepName,
    config: &AppConfig,
    clients: Option<&StepClients>,
) -> Option<Arc<dyn Step>> {
    if name == StepName::Final {
        return Some(Arc::new(FinalStep));
    }
    // clients is None only when every domain step is overridden
    let clients = clients?;
    let step: Arc<dyn Step> = match name {
        StepName::Llm => Arc::new(LlmStep::new(config.llm.clone(), Arc::clone(&clients.llm))),
        StepName::Mem0 => Arc::new(Mem0Step::new(Arc::clone(&clients.memory))),
        StepName::Milvus => Arc::new(MilvusStep::new(
            config.milvus.clone(),
            Arc::clone(&clients.vector),
        )),
        StepName::Mcp => Arc::new(McpStep::new(config.mcp.clone(), Arc::clone(&clients.tool))),
        StepName::Final => Arc::new(FinalStep),
    };
    Some(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateUpdate;
    use crate::testing::FixedStep;

    fn fixed(name: StepName) -> Arc<dyn Step> {
        Arc::new(FixedStep::new(name, StateUpdate::new()))
    }

    #[test]
    fn test_insert_named_rejects_unknown() {
        let mut overrides = StepOverrides::new();
        let err = overrides
            .insert_named("planner", fixed(StepName::Llm))
            .unwrap_err();

        assert_eq!(err, ConfigError::UnknownStep("planner".into()));
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_insert_named_accepts_known() {
        let mut overrides = StepOverrides::new();
        overrides.insert_named("mem0", fixed(StepName::Mem0)).unwrap();

        assert!(overrides.contains(StepName::Mem0));
        assert_eq!(overrides.len(), 1);
    }

    #[test]
    fn test_full_override_needs_no_clients() {
        let overrides = StepName::DOMAIN
            .iter()
            .fold(StepOverrides::new(), |acc, name| acc.with(*name, fixed(*name)));

        let registry = StepRegistry::build(&AppConfig::default(), &overrides).unwrap();
        let order: Vec<StepName> = registry.iter().map(|(n, _)| n).collect();

        assert_eq!(order, StepName::ALL.to_vec());
        assert_eq!(registry.resolve(StepName::Final).map(|s| s.name()), Some("final"));
    }

    #[test]
    fn test_defaults_fill_gaps() {
        let overrides = StepOverrides::new().with(StepName::Llm, fixed(StepName::Llm));

        let registry = StepRegistry::build(&AppConfig::default(), &overrides).unwrap();

        let llm = registry.resolve(StepName::Llm).unwrap();
        assert!(Arc::ptr_eq(llm, overrides.get(StepName::Llm).unwrap()));
        assert!(format!("{:?}", registry.resolve(StepName::Mem0).unwrap()).contains("Mem0Step"));
    }
}

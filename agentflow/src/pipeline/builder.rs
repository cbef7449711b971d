//! Pipeline builder.

use std::sync::Arc;

use super::Pipeline;
use crate::checkpoint::CheckpointStore;
use crate::clients::StepClients;
use crate::config::AppConfig;
use crate::errors::AgentflowError;
use crate::observability::{backend_from_config, Trace, TraceBackend, TraceBinding};
use crate::steps::{StepOverrides, StepRegistry};

#[derive(Debug, Clone, Default)]
enum TracingSetup {
    #[default]
    FromConfig,
    Backend(Arc<dyn TraceBackend>),
    Disabled,
}

/// Builder for [`Pipeline`].
///
/// Every fallible part of a run (client construction, backend selection)
/// happens in [`build`](Self::build), before any step executes.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    config: AppConfig,
    overrides: StepOverrides,
    clients: Option<StepClients>,
    tracing: TracingSetup,
    run_trace: Option<Trace>,
    checkpointer: Option<Arc<dyn CheckpointStore>>,
}

impl PipelineBuilder {
    /// Creates a builder for `config`.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            overrides: StepOverrides::new(),
            clients: None,
            tracing: TracingSetup::FromConfig,
            run_trace: None,
            checkpointer: None,
        }
    }

    /// Sets the step overrides.
    #[must_use]
    pub fn overrides(mut self, overrides: StepOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Uses explicit clients for the default steps.
    #[must_use]
    pub fn clients(mut self, clients: StepClients) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Uses `backend` instead of the Langfuse configuration.
    #[must_use]
    pub fn trace_backend(mut self, backend: Arc<dyn TraceBackend>) -> Self {
        self.tracing = TracingSetup::Backend(backend);
        self
    }

    /// Turns tracing off regardless of configuration.
    #[must_use]
    pub fn without_tracing(mut self) -> Self {
        self.tracing = TracingSetup::Disabled;
        self
    }

    /// Attaches every step span to `trace`.
    ///
    /// The pipeline then never clears the trace context.
    #[must_use]
    pub fn run_trace(mut self, trace: Trace) -> Self {
        self.run_trace = Some(trace);
        self
    }

    /// Persists state after each step into `checkpointer`.
    #[must_use]
    pub fn checkpointer(mut self, checkpointer: Arc<dyn CheckpointStore>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if a default client cannot be constructed.
    pub fn build(self) -> Result<Pipeline, AgentflowError> {
        let registry = match self.clients {
            Some(ref clients) => StepRegistry::with_clients(&self.config, &self.overrides, clients),
            None => StepRegistry::build(&self.config, &self.overrides)?,
        };

        let backend = match self.tracing {
            TracingSetup::FromConfig => backend_from_config(&self.config.langfuse),
            TracingSetup::Backend(backend) => Some(backend),
            TracingSetup::Disabled => None,
        };

        Ok(Pipeline {
            registry,
            binding: TraceBinding::new(backend, self.run_trace),
            checkpointer: self.checkpointer,
        })
    }
}

//! Run tracing.

mod backend;
mod binding;
mod langfuse;
mod check;

pub use backend::{merge_metadata, LoggingTraceBackend, Span, Trace, TraceBackend};
pub use binding::{SpanGuard, SpanTimer, TraceBinding, TraceContext, RUN_TRACE_NAME};
pub use langfuse::LangfuseBackend;
pub use check::{send_test_trace, TraceCheckReport, TraceCheckStatus};

use crate::config::LangfuseConfig;
use crate::errors::TraceError;
use std::sync::Arc;

/// Builds the configured tracing backend, or `None` when Langfuse is not set up.
#[must_use]
pub fn backend_from_config(config: &LangfuseConfig) -> Option<Arc<dyn TraceBackend>> {
    if !config.is_enabled() {
        return None;
    }
    let timeout = config.delivery_timeout();
    let backend = reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(TraceError::from)
        .and_then(|http| LangfuseBackend::new(config, http));
    match backend {
        Ok(backend) => Some(Arc::new(backend)),
        Err(err) => {
            tracing::warn!(error = %err, "Tracing disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_requires_all_keys() {
        let partial = LangfuseConfig {
            public_key: Some("pk".into()),
            host: Some("http://localhost:3000".into()),
            ..Default::default()
        };
        assert!(backend_from_config(&partial).is_none());

        let full = LangfuseConfig {
            secret_key: Some("sk".into()),
            ..partial
        };
        assert!(backend_from_config(&full).is_some());
    }
}

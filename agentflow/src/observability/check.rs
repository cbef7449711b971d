//! One-shot tracing connectivity check.

use serde::Serialize;
use serde_json::{Map, Value};

use super::backend::TraceBackend;

/// Outcome of [`send_test_trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceCheckStatus {
    /// Trace and span were recorded and flushed.
    Success,
    /// No backend configured.
    Skipped,
    /// Backend call failed.
    Failed,
}

/// Report produced by [`send_test_trace`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceCheckReport {
    /// Outcome.
    pub status: TraceCheckStatus,
    /// Created trace id.
    pub trace_id: Option<String>,
    /// Created span id.
    pub span_id: Option<String>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceCheckReport {
    fn skipped() -> Self {
        Self {
            status: TraceCheckStatus::Skipped,
            trace_id: None,
            span_id: None,
            error: None,
        }
    }

    fn failed(trace_id: Option<String>, error: impl ToString) -> Self {
        Self {
            status: TraceCheckStatus::Failed,
            trace_id,
            span_id: None,
            error: Some(error.to_string()),
        }
    }
}

/// Records a single trace with one span and flushes it.
///
/// Never fails: problems are reported in the returned [`TraceCheckReport`].
pub async fn send_test_trace(
    backend: Option<&dyn TraceBackend>,
    trace_name: &str,
    span_name: &str,
    metadata: Map<String, Value>,
    span_metadata: Map<String, Value>,
) -> TraceCheckReport {
    let Some(backend) = backend else {
        return TraceCheckReport::skipped();
    };

    let trace = match backend.create_trace(trace_name, metadata) {
        Ok(trace) => trace,
        Err(err) => return TraceCheckReport::failed(None, err),
    };
    let span = match backend.open_span(&trace, span_name, span_metadata) {
        Ok(span) => span,
        Err(err) => return TraceCheckReport::failed(Some(trace.id), err),
    };
    if let Err(err) = backend.close_span(&span) {
        return TraceCheckReport::failed(Some(trace.id), err);
    }
    if let Err(err) = backend.flush().await {
        tracing::warn!(error = %err, "Test trace flush failed");
        return TraceCheckReport::failed(Some(trace.id), err);
    }

    TraceCheckReport {
        status: TraceCheckStatus::Success,
        trace_id: Some(trace.id),
        span_id: Some(span.id),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTraceBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_trace_check_without_backend_is_skipped() {
        let report = send_test_trace(None, "diagnostic", "diagnostic-span", Map::new(), Map::new())
            .await;
        assert_eq!(report.status, TraceCheckStatus::Skipped);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"status": "skipped", "trace_id": null, "span_id": null})
        );
    }

    #[tokio::test]
    async fn test_trace_check_records_trace_and_span() {
        let backend = RecordingTraceBackend::new();
        let report = send_test_trace(
            Some(&backend),
            "diagnostic",
            "diagnostic-span",
            Map::new(),
            Map::new(),
        )
        .await;

        assert_eq!(report.status, TraceCheckStatus::Success);
        assert_eq!(report.trace_id, backend.traces().first().map(|t| t.id.clone()));
        assert_eq!(backend.closed_spans(), vec!["diagnostic-span"]);
        assert_eq!(backend.flushes(), 1);
    }

    #[tokio::test]
    async fn test_trace_check_reports_failure() {
        let backend = RecordingTraceBackend::failing();
        let report = send_test_trace(
            Some(&backend),
            "diagnostic",
            "diagnostic-span",
            Map::new(),
            Map::new(),
        )
        .await;

        assert_eq!(report.status, TraceCheckStatus::Failed);
        assert!(report.error.is_some());
    }
}

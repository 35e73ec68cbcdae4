//! Span download and re-emission.

use crate::client::AnalyticsClient;
use crate::models::TraceReference;
use crate::sink::TelemetrySink;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Counters of a span export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanStats {
    /// Spans handed to the sink.
    pub spans_emitted: usize,
    /// Traces whose spans could not be fetched.
    pub failed_traces: usize,
}

/// Fetches the spans of every trace concurrently and emits them.
///
/// A failing trace is logged and counted; the others are unaffected.
pub async fn export_spans(
    client: &Arc<AnalyticsClient>,
    sink: &Arc<dyn TelemetrySink>,
    traces: Vec<TraceReference>,
    cancel: &CancellationToken,
) -> SpanStats {
    let mut tasks = JoinSet::new();

    for trace in traces {
        let client = Arc::clone(client);
        let sink = Arc::clone(sink);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let spans = match client.trace_spans(&trace.trace_id, &cancel).await {
                Ok(spans) => spans,
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!(trace_id = %trace.trace_id, error = %e, "Span download failed");
                    }
                    return None;
                }
            };
            if cancel.is_cancelled() {
                return None;
            }
            for span in &spans {
                sink.emit_span(&trace.trace_id, span);
            }
            debug!(trace_id = %trace.trace_id, spans = spans.len(), "Trace exported");
            Some(spans.len())
        });
    }

    let mut stats = SpanStats::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(emitted)) => stats.spans_emitted += emitted,
            Ok(None) => stats.failed_traces += 1,
            Err(e) => {
                stats.failed_traces += 1;
                warn!(error = %e, "Span export task failed");
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ThrottleConfig, UpstreamConfig};
    use crate::models::Cursor;
    use crate::sink::InMemorySink;
    use crate::throttle::Throttle;
    use mockito::Server;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_one_trace_failing_does_not_affect_others() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/application-monitoring/v2/analyze/traces/ok")
            .with_status(200)
            .with_body(
                json!({"items": [
                    {"id": "s1", "name": "GET /", "duration": 12},
                    {"id": "s2", "parentId": "s1", "name": "SELECT"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/application-monitoring/v2/analyze/traces/gone")
            .with_status(404)
            .create_async()
            .await;

        let throttle = Arc::new(Throttle::new(ThrottleConfig::new(100, Duration::from_secs(1))));
        let client = Arc::new(
            AnalyticsClient::new(&UpstreamConfig::new(server.url(), "token"), throttle).unwrap(),
        );
        let memory = InMemorySink::new();
        let sink: Arc<dyn TelemetrySink> = Arc::new(memory.clone());

        let stats = export_spans(
            &client,
            &sink,
            vec![
                TraceReference::new("ok", Cursor::new(1, 1)),
                TraceReference::new("gone", Cursor::new(1, 2)),
            ],
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(stats.spans_emitted, 2);
        assert_eq!(stats.failed_traces, 1);
        let spans = memory.spans();
        assert!(spans.iter().all(|s| s.trace_id == "ok"));
        assert_eq!(spans[1].span.parent_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_cancelled_export_emits_nothing() {
        let server = Server::new_async().await;
        let throttle = Arc::new(Throttle::new(ThrottleConfig::new(100, Duration::from_secs(1))));
        let client = Arc::new(
            AnalyticsClient::new(&UpstreamConfig::new(server.url(), "token"), throttle).unwrap(),
        );
        let memory = InMemorySink::new();
        let sink: Arc<dyn TelemetrySink> = Arc::new(memory.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = export_spans(
            &client,
            &sink,
            vec![TraceReference::new("t1", Cursor::new(1, 1))],
            &cancel,
        )
        .await;

        assert_eq!(stats.spans_emitted, 0);
        assert_eq!(memory.span_count(), 0);
    }
}

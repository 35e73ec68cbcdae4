//! Chunked metric retrieval.
//!
//! The entity retrieval endpoint accepts a limited number of metrics per call,
//! so each entity type's metric list is split into contiguous chunks and one
//! call is issued per chunk. Chunks of one type run in order; types run
//! concurrently.

use super::correlate::{correlate_items, Correlated};
use crate::client::{AnalyticsClient, ClientError, EntitiesRequest};
use crate::config::BatchConfig;
use crate::models::{EntityType, MetricDefinition};
use crate::sink::TelemetrySink;
use std::ops::AddAssign;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Counters of a retrieval run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrievalStats {
    /// Retrieval calls issued.
    pub chunks_requested: usize,
    /// Calls that failed for any reason.
    pub chunks_failed: usize,
    /// Calls rejected with a rate limit.
    pub chunks_rate_limited: usize,
    /// Samples handed to the sink.
    pub samples_emitted: usize,
    /// Series that matched no requested definition.
    pub correlation_failures: usize,
}

impl AddAssign for RetrievalStats {
    fn add_assign(&mut self, other: Self) {
        self.chunks_requested += other.chunks_requested;
        self.chunks_failed += other.chunks_failed;
        self.chunks_rate_limited += other.chunks_rate_limited;
        self.samples_emitted += other.samples_emitted;
        self.correlation_failures += other.correlation_failures;
    }
}

/// Splits `metrics` into contiguous chunks of at most `size` definitions.
///
/// A `size` of zero is treated as one.
#[must_use]
pub fn chunk_metrics(metrics: &[MetricDefinition], size: usize) -> Vec<&[MetricDefinition]> {
    metrics.chunks(size.max(1)).collect()
}

/// Retrieves one chunk for one entity type and correlates the response.
///
/// # Errors
///
/// Returns the client error of the retrieval call; nothing is correlated then.
pub async fn fetch_chunk(
    client: &AnalyticsClient,
    window_ms: u64,
    entity_type: &str,
    chunk: &[MetricDefinition],
    retrieval_size: u32,
    cancel: &CancellationToken,
) -> Result<Correlated, ClientError> {
    let request = EntitiesRequest::new(window_ms, entity_type, chunk, retrieval_size);
    let items = client.list_entities(&request, cancel).await?;
    Ok(correlate_items(&items, entity_type, chunk))
}

/// Retrieves every chunk of one entity type and emits the matched samples.
///
/// A failing chunk is skipped. A rate-limited chunk also stops the remaining
/// chunks of this type.
pub async fn retrieve_type(
    client: &AnalyticsClient,
    sink: &dyn TelemetrySink,
    entity_type: &EntityType,
    window_ms: u64,
    batch: &BatchConfig,
    cancel: &CancellationToken,
) -> RetrievalStats {
    let mut stats = RetrievalStats::default();
    let chunks = chunk_metrics(&entity_type.metrics, batch.metrics_per_request);
    let total = chunks.len();

    for (index, chunk) in chunks.into_iter().enumerate() {
        stats.chunks_requested += 1;

        match fetch_chunk(
            client,
            window_ms,
            &entity_type.name,
            chunk,
            batch.retrieval_size,
            cancel,
        )
        .await
        {
            Ok(correlated) => {
                for sample in &correlated.samples {
                    sink.emit_metric_sample(sample);
                }
                debug!(
                    entity_type = %entity_type.name,
                    chunk = index,
                    samples = correlated.samples.len(),
                    unmatched = correlated.failures,
                    "Chunk retrieved"
                );
                stats.samples_emitted += correlated.samples.len();
                stats.correlation_failures += correlated.failures;
            }
            Err(e) if e.is_rate_limited() => {
                stats.chunks_failed += 1;
                stats.chunks_rate_limited += 1;
                warn!(
                    entity_type = %entity_type.name,
                    chunk = index,
                    skipped_chunks = total - index - 1,
                    error = %e,
                    "Rate limited; skipping remaining chunks of entity type"
                );
                break;
            }
            Err(e) if e.is_cancelled() => {
                stats.chunks_failed += 1;
                break;
            }
            Err(e) => {
                stats.chunks_failed += 1;
                warn!(
                    entity_type = %entity_type.name,
                    chunk = index,
                    error = %e,
                    "Chunk retrieval failed"
                );
            }
        }
    }

    stats
}

/// Retrieves all entity types concurrently and sums their counters.
pub async fn retrieve_all(
    client: &Arc<AnalyticsClient>,
    sink: &Arc<dyn TelemetrySink>,
    entity_types: Vec<EntityType>,
    window_ms: u64,
    batch: &BatchConfig,
    cancel: &CancellationToken,
) -> RetrievalStats {
    let mut tasks = JoinSet::new();

    for entity_type in entity_types.into_iter().filter(|t| !t.metrics.is_empty()) {
        let client = Arc::clone(client);
        let sink = Arc::clone(sink);
        let batch = batch.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            retrieve_type(&client, sink.as_ref(), &entity_type, window_ms, &batch, &cancel).await
        });
    }

    let mut stats = RetrievalStats::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(type_stats) => stats += type_stats,
            Err(e) => warn!(error = %e, "Entity type retrieval task failed"),
        }
    }
    stats
}

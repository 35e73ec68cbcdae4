//! Entity type and metric discovery.

use crate::client::{AnalyticsClient, ClientError};
use crate::models::{EntityType, MetricDefinition};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Entity types with the metrics available for each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    /// Entity types in listing order.
    pub entity_types: Vec<EntityType>,
    /// Types whose metric lookup failed; they keep an empty metric list.
    pub failures: usize,
}

impl Catalog {
    /// Total number of metric definitions across all types.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.entity_types.iter().map(|t| t.metrics.len()).sum()
    }
}

/// Lists entity types, then looks up the metrics of every type concurrently.
///
/// Definitions without an id are dropped.
///
/// # Errors
///
/// Returns an error only if the entity type listing itself fails.
pub async fn build_catalog(
    client: &Arc<AnalyticsClient>,
    window_ms: u64,
    cancel: &CancellationToken,
) -> Result<Catalog, ClientError> {
    let names = client.list_entity_types(window_ms, cancel).await?;
    debug!(entity_types = names.len(), "Listed entity types");

    let mut entity_types: Vec<EntityType> = names.into_iter().map(EntityType::new).collect();
    let mut tasks = JoinSet::new();

    for (index, entity_type) in entity_types.iter().enumerate() {
        let client = Arc::clone(client);
        let cancel = cancel.clone();
        let name = entity_type.name.clone();
        tasks.spawn(async move {
            let result = client.list_metrics_for_type(window_ms, &name, &cancel).await;
            (index, result)
        });
    }

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(metrics))) => {
                entity_types[index].metrics = usable(metrics);
            }
            Ok((index, Err(e))) => {
                failures += 1;
                warn!(
                    entity_type = %entity_types[index].name,
                    error = %e,
                    "Metric lookup failed"
                );
            }
            Err(e) => {
                failures += 1;
                warn!(error = %e, "Metric lookup task failed");
            }
        }
    }

    Ok(Catalog {
        entity_types,
        failures,
    })
}

fn usable(metrics: Vec<MetricDefinition>) -> Vec<MetricDefinition> {
    let total = metrics.len();
    let kept: Vec<_> = metrics
        .into_iter()
        .filter(|definition| definition.validate_definition().is_ok())
        .collect();
    if kept.len() < total {
        debug!(dropped = total - kept.len(), "Dropped metric definitions without id");
    }
    kept
}

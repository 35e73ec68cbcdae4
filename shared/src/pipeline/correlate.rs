//! Matching of returned metric series to requested definitions.
//!
//! Every retrieved entity reports a map of metric key to series. Only the
//! first key (in API order) and the first `[time, value]` point of its series
//! are used. The key is matched to the definition whose `id` is the longest
//! prefix of it.

use crate::client::EntityItem;
use crate::models::{MetricDefinition, MetricSample};
use serde_json::Value;
use tracing::debug;

/// Outcome of correlating one entity item.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// The first series matched a definition.
    Matched(MetricSample),
    /// The first series key matched no definition of the batch.
    Unmatched {
        /// Key that failed to match.
        metric_key: String,
    },
    /// The item carried no usable data point.
    Skipped,
}

/// Samples and failures of a whole retrieval response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlated {
    /// Matched samples, in item order.
    pub samples: Vec<MetricSample>,
    /// Items whose key matched no definition.
    pub failures: usize,
    /// Items without metrics or without a usable point.
    pub skipped: usize,
}

/// Returns the definition with the longest `id` that prefixes `metric_key`.
///
/// Catalog order does not decide between a general and a more specific
/// definition: `cpu` listed before `cpu.used` still resolves
/// `cpu.used.value` to `cpu.used`. Among definitions of equal length the
/// first one wins.
#[must_use]
pub fn best_match<'a>(
    metric_key: &str,
    definitions: &'a [MetricDefinition],
) -> Option<&'a MetricDefinition> {
    definitions
        .iter()
        .filter(|definition| definition.matches(metric_key))
        .fold(None, |best: Option<&MetricDefinition>, candidate| match best {
            Some(best) if best.id.len() >= candidate.id.len() => Some(best),
            _ => Some(candidate),
        })
}

/// Reads the first `[time, value]` pair of a series.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn first_point(series: &Value) -> Option<(i64, f64)> {
    let point = series.as_array()?.first()?.as_array()?;
    let time = point.first()?;
    let time = time.as_i64().or_else(|| time.as_f64().map(|t| t as i64))?;
    let value = point.get(1)?.as_f64()?;
    Some((time, value))
}

/// Correlates one entity item against the definitions of its batch.
///
/// `entity_type` is used when the item does not name its plugin.
#[must_use]
pub fn correlate_item(
    item: &EntityItem,
    entity_type: &str,
    definitions: &[MetricDefinition],
) -> Correlation {
    let Some((metric_key, series)) = item.metrics.as_ref().and_then(|m| m.iter().next()) else {
        return Correlation::Skipped;
    };
    let Some(point) = first_point(series) else {
        return Correlation::Skipped;
    };
    let Some(definition) = best_match(metric_key, definitions) else {
        return Correlation::Unmatched {
            metric_key: metric_key.clone(),
        };
    };

    Correlation::Matched(MetricSample::correlated(
        item.plugin.as_deref().unwrap_or(entity_type),
        item.label.as_deref().unwrap_or_default(),
        metric_key.as_str(),
        point,
        definition,
    ))
}

/// Correlates every item of a retrieval response.
#[must_use]
pub fn correlate_items(
    items: &[EntityItem],
    entity_type: &str,
    definitions: &[MetricDefinition],
) -> Correlated {
    let mut correlated = Correlated::default();

    for item in items {
        match correlate_item(item, entity_type, definitions) {
            Correlation::Matched(sample) => correlated.samples.push(sample),
            Correlation::Unmatched { metric_key } => {
                debug!(
                    entity_type,
                    entity_label = item.label.as_deref().unwrap_or_default(),
                    metric_key,
                    "No metric definition matches returned series"
                );
                correlated.failures += 1;
            }
            Correlation::Skipped => correlated.skipped += 1,
        }
    }

    correlated
}

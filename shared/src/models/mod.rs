//! Data models for the export pipeline.
//!
//! This module contains the metric catalog, trace listing and span structures
//! exchanged with the upstream analytics API.

pub mod metric;
pub mod trace;

use serde::{Deserialize, Deserializer};

pub use metric::{EntityType, MetricDefinition, MetricDefinitionError, MetricSample};
pub use trace::{Cursor, SpanRecord, TraceReference};

/// Deserializes a nullable JSON string into an empty string when `null`.
pub(crate) fn nullable<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

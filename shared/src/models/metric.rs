//! Infrastructure metric data models.
//!
//! Defines the metric catalog (entity types and their metric definitions) as
//! returned by the upstream analytics API, and the `MetricSample` produced by
//! correlating a returned series back to its definition.

use chrono::{DateTime, Utc};
use super::nullable;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// A metric available for an entity type.
///
/// # Example
///
/// ```
/// use shared::models::MetricDefinition;
///
/// let definition = MetricDefinition::new("cpu.used", "CPU used")
///     .with_description("CPU usage")
///     .with_format("PERCENTAGE");
///
/// assert!(definition.validate_definition().is_ok());
/// assert!(definition.matches("cpu.used.value"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    /// Metric identifier; series keys returned by the API start with it.
    #[validate(length(min = 1, message = "Metric id cannot be empty"))]
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,

    /// Infrastructure tag category.
    #[serde(default, deserialize_with = "nullable")]
    pub infra_tag_category: String,

    /// Metric category.
    #[serde(default, deserialize_with = "nullable")]
    pub category: String,

    /// Human readable label.
    #[serde(default, deserialize_with = "nullable")]
    pub label: String,

    /// Description of the metric.
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,

    /// Value format (used as the unit on re-emission).
    #[serde(default, deserialize_with = "nullable")]
    pub format: String,
}

/// Errors that can occur during metric definition validation.
#[derive(Debug, Error)]
pub enum MetricDefinitionError {
    /// The metric id is empty.
    #[error("Metric id cannot be empty")]
    EmptyId,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl MetricDefinition {
    /// Creates a new metric definition with empty metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            infra_tag_category: String::new(),
            category: String::new(),
            label: label.into(),
            description: String::new(),
            format: String::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Returns true if the series key was produced for this metric.
    #[must_use]
    pub fn matches(&self, metric_key: &str) -> bool {
        metric_key.starts_with(&self.id)
    }

    /// Validates the definition.
    ///
    /// An empty id would prefix-match every series key, so it is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty.
    pub fn validate_definition(&self) -> Result<(), MetricDefinitionError> {
        if self.id.is_empty() {
            return Err(MetricDefinitionError::EmptyId);
        }
        self.validate()?;
        Ok(())
    }
}

/// A monitorable entity type (plugin) and the metrics available for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    /// Entity type name (e.g., "host", "process").
    pub name: String,

    /// Metrics discovered for this type, in API order.
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
}

impl EntityType {
    /// Creates an entity type with no metrics.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: Vec::new(),
        }
    }

    /// Sets the metric list.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Vec<MetricDefinition>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// A single metric observation correlated to its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Entity type (plugin) of the entity that reported the value.
    pub entity_plugin_name: String,

    /// Label of the entity that reported the value.
    pub entity_label: String,

    /// Series key as returned by the API; used as the counter name.
    pub metric_key: String,

    /// Sample time in epoch milliseconds.
    pub time: i64,

    /// Sample value.
    pub value: f64,

    /// Label of the matched definition.
    pub label: String,

    /// Description of the matched definition.
    pub description: String,

    /// Format of the matched definition.
    pub format: String,
}

impl MetricSample {
    /// Builds a sample from a raw data point and its matched definition.
    #[must_use]
    pub fn correlated(
        entity_plugin_name: impl Into<String>,
        entity_label: impl Into<String>,
        metric_key: impl Into<String>,
        point: (i64, f64),
        definition: &MetricDefinition,
    ) -> Self {
        Self {
            entity_plugin_name: entity_plugin_name.into(),
            entity_label: entity_label.into(),
            metric_key: metric_key.into(),
            time: point.0,
            value: point.1,
            label: definition.label.clone(),
            description: definition.description.clone(),
            format: definition.format.clone(),
        }
    }

    /// Returns the sample time as a UTC timestamp, if representable.
    #[must_use]
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_deserialization() {
        let json = r#"{
            "id": "cpu.used",
            "infraTagCategory": "host",
            "category": "CPU",
            "label": "CPU used",
            "description": "Percentage of CPU in use",
            "format": "PERCENTAGE"
        }"#;

        let definition: MetricDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(definition.id, "cpu.used");
        assert_eq!(definition.infra_tag_category, "host");
        assert_eq!(definition.format, "PERCENTAGE");
    }

    #[test]
    fn test_definition_null_fields_default_to_empty() {
        let json = r#"{"id": "mem.free", "label": null, "description": null}"#;

        let definition: MetricDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(definition.label, "");
        assert_eq!(definition.description, "");
        assert_eq!(definition.category, "");
    }

    #[test]
    fn test_definition_missing_or_null_id_fails_validation() {
        let missing: MetricDefinition = serde_json::from_str(r#"{"label": "no id"}"#).unwrap();
        let null: MetricDefinition =
            serde_json::from_str(r#"{"id": null, "label": "null id"}"#).unwrap();

        assert_eq!(missing.id, "");
        assert_eq!(null.id, "");
        assert!(missing.validate_definition().is_err());
        assert!(null.validate_definition().is_err());
    }

    #[test]
    fn test_definition_prefix_match() {
        let definition = MetricDefinition::new("cpu.used", "CPU used");

        assert!(definition.matches("cpu.used"));
        assert!(definition.matches("cpu.used.value"));
        assert!(!definition.matches("cpu.user"));
    }

    #[test]
    fn test_definition_validation_empty_id() {
        let definition = MetricDefinition::new("", "nothing");
        assert!(matches!(
            definition.validate_definition(),
            Err(MetricDefinitionError::EmptyId)
        ));
    }

    #[test]
    fn test_sample_copies_definition_metadata() {
        let definition = MetricDefinition::new("cpu.used", "CPU used")
            .with_description("CPU usage")
            .with_format("PERCENTAGE");

        let sample = MetricSample::correlated(
            "host",
            "web-1",
            "cpu.used.value",
            (1_690_000_000_000, 42.0),
            &definition,
        );

        assert_eq!(sample.label, "CPU used");
        assert_eq!(sample.description, "CPU usage");
        assert_eq!(sample.format, "PERCENTAGE");
        assert_eq!(
            sample.observed_at().map(|t| t.timestamp()),
            Some(1_690_000_000)
        );
    }
}

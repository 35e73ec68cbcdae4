//! Trace listing and span data models.
//!
//! A `TraceReference` is what the trace listing endpoint returns for each
//! trace; a `SpanRecord` is a single span of a downloaded trace.

use super::nullable;
use serde::{Deserialize, Serialize};

/// Opaque pagination marker of the trace listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Ingestion time of the item the cursor points at.
    pub ingestion_time: i64,
    /// Offset within items sharing the same ingestion time.
    pub offset: i64,
}

impl Cursor {
    /// Creates a new cursor.
    #[must_use]
    pub fn new(ingestion_time: i64, offset: i64) -> Self {
        Self {
            ingestion_time,
            offset,
        }
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.ingestion_time, self.offset)
    }
}

/// A trace as seen by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceReference {
    /// Trace identifier; the identity used for deduplication.
    pub trace_id: String,
    /// Position of this trace in the listing.
    pub cursor: Cursor,
}

impl TraceReference {
    /// Creates a new trace reference.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, cursor: Cursor) -> Self {
        Self {
            trace_id: trace_id.into(),
            cursor,
        }
    }
}

/// A span of a downloaded trace.
///
/// Every field except `id` may be missing or `null` upstream.
///
/// # Example
///
/// ```
/// use shared::models::SpanRecord;
///
/// let span: SpanRecord = serde_json::from_str(
///     r#"{"id": "s1", "parentId": null, "name": "GET /", "duration": 12}"#,
/// )
/// .unwrap();
///
/// assert!(span.is_root());
/// assert_eq!(span.duration, Some(12));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    /// Span identifier.
    pub id: String,

    /// Parent span identifier (None for root spans).
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Parent span identifier from a foreign tracer.
    #[serde(default)]
    pub foreign_parent_id: Option<String>,

    /// Start timestamp in epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,

    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: Option<i64>,

    /// Minimum self time in milliseconds.
    #[serde(default)]
    pub min_self_time: Option<i64>,

    /// Network time in milliseconds.
    #[serde(default)]
    pub network_time: Option<i64>,

    /// Number of calls aggregated into this span.
    #[serde(default)]
    pub call_count: Option<i64>,

    /// Number of erroneous calls.
    #[serde(default)]
    pub error_count: Option<i64>,

    /// Operation name.
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
}

impl SpanRecord {
    /// Creates a span record with only an id and a name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            foreign_parent_id: None,
            timestamp: None,
            duration: None,
            min_self_time: None,
            network_time: None,
            call_count: None,
            error_count: None,
            name: name.into(),
        }
    }

    /// Sets the parent span id.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the start timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Returns true if this is a root span (no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

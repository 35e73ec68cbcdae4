//! Request and response bodies of the upstream analytics API.
//!
//! Responses keep every collection optional so that a missing field is
//! reported as a protocol error by the client instead of silently becoming
//! an empty result.

use crate::models::{Cursor, MetricDefinition, SpanRecord, TraceReference};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path of the entity type listing.
pub const ENTITY_TYPES_PATH: &str = "/api/infrastructure-monitoring/analyze/entity-types";
/// Path of the per-type metric catalog.
pub const METRIC_CATALOG_PATH: &str = "/api/infrastructure-monitoring/analyze/metrics";
/// Path of the entity metric retrieval.
pub const ENTITIES_PATH: &str = "/api/infrastructure-monitoring/analyze/entities";
/// Path of the trace listing.
pub const TRACE_LIST_PATH: &str = "/api/application-monitoring/analyze/traces";
/// Path template of the span download; the trace id is appended.
pub const TRACE_SPANS_PATH: &str = "/api/application-monitoring/v2/analyze/traces/";

/// Boolean tag filter expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFilterExpression {
    #[serde(rename = "type")]
    kind: &'static str,
    logical_operator: &'static str,
    elements: Vec<TagFilter>,
}

impl TagFilterExpression {
    /// An `AND` expression without elements, matching everything.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            kind: "EXPRESSION",
            logical_operator: "AND",
            elements: Vec::new(),
        }
    }

    /// An expression selecting the application that spans all services.
    #[must_use]
    pub fn all_services() -> Self {
        Self {
            elements: vec![TagFilter {
                kind: "TAG_FILTER",
                name: "application.name",
                operator: "EQUALS",
                entity: "DESTINATION",
                value: "All Services",
            }],
            ..Self::match_all()
        }
    }
}

/// Single tag comparison within an expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagFilter {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    operator: &'static str,
    entity: &'static str,
    value: &'static str,
}

/// Relative time frame ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeFrame {
    /// Lookback in milliseconds.
    pub window_size: u64,
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Order {
    by: &'static str,
    direction: &'static str,
}

impl Order {
    /// Ascending by entity label.
    pub const LABEL_ASC: Self = Self {
        by: "label",
        direction: "ASC",
    };

    /// Descending by trace label.
    pub const TRACE_LABEL_DESC: Self = Self {
        by: "traceLabel",
        direction: "DESC",
    };
}

/// Body of the entity type listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypesRequest {
    tag_filter_expression: TagFilterExpression,
    time_frame: TimeFrame,
}

impl EntityTypesRequest {
    /// Lists entity types seen within the window.
    #[must_use]
    pub fn new(window_ms: u64) -> Self {
        Self {
            tag_filter_expression: TagFilterExpression::match_all(),
            time_frame: TimeFrame {
                window_size: window_ms,
            },
        }
    }
}

/// Body of the per-type metric catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricCatalogRequest {
    tag_filter_expression: TagFilterExpression,
    time_frame: TimeFrame,
    query: String,
    #[serde(rename = "type")]
    entity_type: String,
}

impl MetricCatalogRequest {
    /// Lists every metric available for `entity_type`.
    #[must_use]
    pub fn new(window_ms: u64, entity_type: impl Into<String>) -> Self {
        Self {
            tag_filter_expression: TagFilterExpression::match_all(),
            time_frame: TimeFrame {
                window_size: window_ms,
            },
            query: String::new(),
            entity_type: entity_type.into(),
        }
    }
}

/// One metric requested from the entity retrieval endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSelector {
    metric: String,
    aggregation: &'static str,
    label: String,
}

impl From<&MetricDefinition> for MetricSelector {
    fn from(definition: &MetricDefinition) -> Self {
        Self {
            metric: definition.id.clone(),
            aggregation: "PER_SECOND",
            label: definition.label.clone(),
        }
    }
}

/// Page size of the entity retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalPagination {
    retrieval_size: u32,
}

/// Body of the entity metric retrieval.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesRequest {
    time_frame: TimeFrame,
    tag_filter_expression: TagFilterExpression,
    pagination: RetrievalPagination,
    #[serde(rename = "type")]
    entity_type: String,
    metrics: Vec<MetricSelector>,
    order: Order,
}

impl EntitiesRequest {
    /// Requests `chunk` for every entity of `entity_type`.
    #[must_use]
    pub fn new(
        window_ms: u64,
        entity_type: impl Into<String>,
        chunk: &[MetricDefinition],
        retrieval_size: u32,
    ) -> Self {
        Self {
            time_frame: TimeFrame {
                window_size: window_ms,
            },
            tag_filter_expression: TagFilterExpression::match_all(),
            pagination: RetrievalPagination { retrieval_size },
            entity_type: entity_type.into(),
            metrics: chunk.iter().map(MetricSelector::from).collect(),
            order: Order::LABEL_ASC,
        }
    }

    /// Number of metrics requested.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }
}

/// Body of the trace listing.
///
/// The first page is selected by time frame, every later page by the cursor
/// of the last item already received; the two are never sent together.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceListRequest {
    include_internal: bool,
    include_synthetic: bool,
    tag_filter_expression: TagFilterExpression,
    order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_frame: Option<TimeFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<Cursor>,
}

impl TraceListRequest {
    fn base() -> Self {
        Self {
            include_internal: false,
            include_synthetic: false,
            tag_filter_expression: TagFilterExpression::all_services(),
            order: Order::TRACE_LABEL_DESC,
            time_frame: None,
            pagination: None,
        }
    }

    /// Request for the first page of traces within the window.
    #[must_use]
    pub fn first_page(window_ms: u64) -> Self {
        Self {
            time_frame: Some(TimeFrame {
                window_size: window_ms,
            }),
            ..Self::base()
        }
    }

    /// Request for the page following `cursor`.
    #[must_use]
    pub fn after(cursor: Cursor) -> Self {
        Self {
            pagination: Some(cursor),
            ..Self::base()
        }
    }

    /// Cursor this request continues from, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<Cursor> {
        self.pagination
    }
}

/// Response of the entity type listing.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityTypesResponse {
    /// Entity type names.
    #[serde(default)]
    pub plugins: Option<Vec<String>>,
}

/// Response of the per-type metric catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricCatalogResponse {
    /// Available metrics.
    #[serde(default)]
    pub metrics: Option<Vec<MetricDefinition>>,
}

/// Response of the entity metric retrieval.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitiesResponse {
    /// Matching entities.
    #[serde(default)]
    pub items: Option<Vec<EntityItem>>,
}

/// An entity with the series returned for the requested metrics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EntityItem {
    /// Entity type of the entity.
    #[serde(default)]
    pub plugin: Option<String>,

    /// Entity label.
    #[serde(default)]
    pub label: Option<String>,

    /// Series key to `[[time, value], ...]`, in API order.
    #[serde(default)]
    pub metrics: Option<Map<String, Value>>,
}

/// Response of the trace listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceListResponse {
    /// Traces of this page.
    #[serde(default)]
    pub items: Option<Vec<TraceListItem>>,

    /// Whether another page is available.
    #[serde(default)]
    pub can_load_more: bool,
}

/// A trace listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceListItem {
    /// The trace summary.
    pub trace: TraceSummary,
    /// Position of the entry.
    pub cursor: Cursor,
}

/// Identifying part of a trace listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceSummary {
    /// Trace identifier.
    pub id: String,
}

impl From<TraceListItem> for TraceReference {
    fn from(item: TraceListItem) -> Self {
        TraceReference::new(item.trace.id, item.cursor)
    }
}

/// Response of the span download.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceSpansResponse {
    /// Spans of the trace.
    #[serde(default)]
    pub items: Option<Vec<SpanRecord>>,
}

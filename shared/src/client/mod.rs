//! HTTP client for the upstream analytics API.
//!
//! Every call goes through the shared [`Throttle`], carries the static
//! `authorization: apiToken <token>` header, is bounded by the configured
//! request timeout, and can be abandoned through a [`CancellationToken`].

pub mod error;
pub mod schema;

pub use error::ClientError;
pub use schema::{
    EntitiesRequest, EntityItem, EntityTypesRequest, MetricCatalogRequest, TraceListRequest,
};

use crate::config::UpstreamConfig;
use crate::models::{MetricDefinition, SpanRecord, TraceReference};
use crate::throttle::Throttle;
use reqwest::{header, RequestBuilder, StatusCode};
use schema::{
    EntitiesResponse, EntityTypesResponse, MetricCatalogResponse, TraceListResponse,
    TraceSpansResponse, ENTITIES_PATH, ENTITY_TYPES_PATH, METRIC_CATALOG_PATH, TRACE_LIST_PATH,
    TRACE_SPANS_PATH,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One page of the trace listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePage {
    /// Traces of this page, in server order.
    pub items: Vec<TraceReference>,
    /// Whether another page is available.
    pub can_load_more: bool,
}

/// Client for the analytics endpoints used by the export pipeline.
#[derive(Clone)]
pub struct AnalyticsClient {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
    throttle: Arc<Throttle>,
}

impl std::fmt::Debug for AnalyticsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsClient")
            .field("base_url", &self.base_url)
            .field("throttle", self.throttle.config())
            .finish_non_exhaustive()
    }
}

impl AnalyticsClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &UpstreamConfig, throttle: Arc<Throttle>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            authorization: format!("apiToken {}", config.api_token),
            throttle,
        })
    }

    /// Base URL of the upstream API, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the throttle all calls are paced by.
    #[must_use]
    pub fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    /// Lists the names of entity types seen within the window.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or `plugins` is missing.
    pub async fn list_entity_types(
        &self,
        window_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ClientError> {
        let response: EntityTypesResponse = self
            .post(ENTITY_TYPES_PATH, &EntityTypesRequest::new(window_ms), cancel)
            .await?;
        response
            .plugins
            .ok_or_else(|| ClientError::protocol(ENTITY_TYPES_PATH, "missing 'plugins'"))
    }

    /// Lists the metrics available for one entity type.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or `metrics` is missing.
    pub async fn list_metrics_for_type(
        &self,
        window_ms: u64,
        entity_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<MetricDefinition>, ClientError> {
        let request = MetricCatalogRequest::new(window_ms, entity_type);
        let response: MetricCatalogResponse =
            self.post(METRIC_CATALOG_PATH, &request, cancel).await?;
        response
            .metrics
            .ok_or_else(|| ClientError::protocol(METRIC_CATALOG_PATH, "missing 'metrics'"))
    }

    /// Retrieves entities with the series of the requested metrics.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RateLimited`] on status 429, another error if the
    /// call fails or `items` is missing.
    pub async fn list_entities(
        &self,
        request: &EntitiesRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<EntityItem>, ClientError> {
        let response: EntitiesResponse = self.post(ENTITIES_PATH, request, cancel).await?;
        response
            .items
            .ok_or_else(|| ClientError::protocol(ENTITIES_PATH, "missing 'items'"))
    }

    /// Fetches one page of the trace listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or `items` is missing.
    pub async fn list_traces(
        &self,
        request: &TraceListRequest,
        cancel: &CancellationToken,
    ) -> Result<TracePage, ClientError> {
        let response: TraceListResponse = self.post(TRACE_LIST_PATH, request, cancel).await?;
        let items = response
            .items
            .ok_or_else(|| ClientError::protocol(TRACE_LIST_PATH, "missing 'items'"))?;

        Ok(TracePage {
            items: items.into_iter().map(TraceReference::from).collect(),
            can_load_more: response.can_load_more,
        })
    }

    /// Downloads the spans of one trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or `items` is missing.
    pub async fn trace_spans(
        &self,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SpanRecord>, ClientError> {
        let url = format!("{}{TRACE_SPANS_PATH}{trace_id}", self.base_url);
        let request = self.http.get(url);
        let response: TraceSpansResponse = self.execute(TRACE_SPANS_PATH, request, cancel).await?;
        response
            .items
            .ok_or_else(|| ClientError::protocol(TRACE_SPANS_PATH, "missing 'items'"))
    }

    async fn post<B, R>(
        &self,
        path: &'static str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self.http.post(format!("{}{path}", self.base_url)).json(body);
        self.execute(path, request, cancel).await
    }

    async fn execute<R>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        let request = request.header(header::AUTHORIZATION, &self.authorization);

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = self.throttle.run(move || request.send()) => response?,
        };

        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "Upstream call completed");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited {
                status: status.as_u16(),
                endpoint,
            });
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                endpoint,
            });
        }

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            body = response.bytes() => body?,
        };

        serde_json::from_slice(&body).map_err(|source| ClientError::Decode { endpoint, source })
    }
}

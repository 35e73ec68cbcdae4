//! Cursor-driven trace listing.
//!
//! The first request selects the window; every following request continues
//! from the cursor of the last item of the previous page. Listing ends when
//! the server reports `canLoadMore = false`.

use crate::client::schema::TRACE_LIST_PATH;
use crate::client::{AnalyticsClient, ClientError, TraceListRequest};
use crate::models::TraceReference;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Trace listing stopped early.
///
/// Carries every trace collected before the failing page.
#[derive(Debug, Error)]
#[error("Trace listing stopped after {} traces: {source}", partial.len())]
pub struct PaginationError {
    /// Traces collected before the failure, in fetch order.
    pub partial: Vec<TraceReference>,
    /// What stopped the listing.
    #[source]
    pub source: ClientError,
}

/// Fetches every page of the trace listing for the window.
///
/// # Errors
///
/// Returns a [`PaginationError`] holding the partial result when a page
/// fails, when an empty page claims more data, or when the cursor repeats.
pub async fn list_all_traces(
    client: &AnalyticsClient,
    window_ms: u64,
    cancel: &CancellationToken,
) -> Result<Vec<TraceReference>, PaginationError> {
    let mut collected = Vec::new();
    let mut request = TraceListRequest::first_page(window_ms);
    let mut pages = 0usize;

    loop {
        let page = match client.list_traces(&request, cancel).await {
            Ok(page) => page,
            Err(source) => {
                return Err(PaginationError {
                    partial: collected,
                    source,
                })
            }
        };
        pages += 1;

        let next = page.items.last().map(|trace| trace.cursor);
        debug!(
            page = pages,
            items = page.items.len(),
            can_load_more = page.can_load_more,
            "Fetched trace page"
        );
        collected.extend(page.items);

        if !page.can_load_more {
            return Ok(collected);
        }

        let Some(next) = next else {
            return Err(PaginationError {
                partial: collected,
                source: ClientError::protocol(TRACE_LIST_PATH, "empty page with canLoadMore=true"),
            });
        };
        if request.cursor() == Some(next) {
            return Err(PaginationError {
                partial: collected,
                source: ClientError::protocol(
                    TRACE_LIST_PATH,
                    format!("cursor {next} did not advance"),
                ),
            });
        }

        request = TraceListRequest::after(next);
    }
}

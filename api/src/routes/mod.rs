//! API route definitions.
//!
//! This module organizes all HTTP routes for the APM Bridge API server.

mod export;
mod health;

pub use export::{export_routes, ExportParams, PROCESSING};
pub use health::health_routes;

//! Defines routes for the aggregation endpoints.
//!
//! ## Structure
//! - **Aggregation endpoints**
//!   - `GET /merge`    — merge `.xlsx` workbooks for a date window into one workbook
//!   - `GET /compress` — pack matching files for a date window into one zip
//!
//! - **Operational endpoints**
//!   - `GET /healthz` — liveness
//!   - `GET /readyz`  — readiness (blob-store reachability)

use crate::{
    handlers::{
        aggregate_handlers::{compress_files, merge_files},
        health_handlers::{healthz, readyz},
    },
    services::aggregation_service::AggregationService,
};
use axum::{Router, routing::get};

/// Build and return the router for all aggregation routes.
///
/// The router carries shared state (`AggregationService`) to all handlers.
pub fn routes() -> Router<AggregationService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // aggregation endpoints
        .route("/merge", get(merge_files))
        .route("/compress", get(compress_files))
}

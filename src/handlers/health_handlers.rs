//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks blob-store reachability

use crate::services::aggregation_service::AggregationService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that lists the configured source bucket — the one
/// external dependency this service has. Returns JSON describing the check.
/// HTTP 200 when it passes, HTTP 503 when it fails.
pub async fn readyz(State(service): State<AggregationService>) -> impl IntoResponse {
    let blob_check = match service
        .store
        .list_objects(&service.settings.source_bucket, None)
        .await
    {
        Ok(_) => (true, None::<String>),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let blob_ok = blob_check.0;
    let mut checks = HashMap::new();
    checks.insert(
        "blob_store",
        CheckStatus {
            ok: blob_ok,
            error: blob_check.1,
        },
    );

    let body = ReadyResponse {
        status: if blob_ok { "ok".into() } else { "error".into() },
        checks,
    };

    let status = if blob_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

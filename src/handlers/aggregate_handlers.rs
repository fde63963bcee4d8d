//! HTTP handlers for the two aggregation modes.
//!
//! Both endpoints take the date window as query parameters and delegate the
//! whole run to `AggregationService`; every pipeline failure converts into
//! one `AppError` response.

use crate::{
    errors::AppError,
    services::aggregation_service::{AggregationOutcome, AggregationService},
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

/// Query params accepted by `GET /merge`.
#[derive(Debug, Deserialize)]
pub struct MergeQuery {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

/// Query params accepted by `GET /compress`.
#[derive(Debug, Deserialize)]
pub struct CompressQuery {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    /// Extension to pack; defaults to `pdf` when absent.
    #[serde(rename = "fileType")]
    pub file_type: Option<String>,
}

/// Success body: a human-readable summary plus the presigned link.
#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    pub message: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

impl From<AggregationOutcome> for AggregateResponse {
    fn from(outcome: AggregationOutcome) -> Self {
        Self {
            message: outcome.message,
            download_url: outcome.download_url,
        }
    }
}

/// `GET /merge?startDate=&endDate=` — merge date-scoped workbooks into one.
pub async fn merge_files(
    State(service): State<AggregationService>,
    Query(query): Query<MergeQuery>,
) -> Result<Json<AggregateResponse>, AppError> {
    let outcome = service
        .merge_workbooks(query.start_date, query.end_date)
        .await?;
    Ok(Json(outcome.into()))
}

/// `GET /compress?startDate=&endDate=&fileType=` — pack date-scoped files
/// into one zip.
pub async fn compress_files(
    State(service): State<AggregationService>,
    Query(query): Query<CompressQuery>,
) -> Result<Json<AggregateResponse>, AppError> {
    let outcome = service
        .pack_archive(query.start_date, query.end_date, query.file_type)
        .await?;
    Ok(Json(outcome.into()))
}

use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::aggregation_service::{AggregationLimits, AggregationService, AggregationSettings};
use services::blob_store::S3BlobStore;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-bundler with config: {:?}", cfg);

    // --- Build the S3 client ---
    let aws_cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let mut s3_builder = aws_sdk_s3::config::Builder::from(&aws_cfg);
    if let Some(endpoint) = &cfg.s3_endpoint {
        // Path-style addressing for MinIO-like deployments.
        s3_builder = s3_builder.endpoint_url(endpoint).force_path_style(true);
    }
    let client = aws_sdk_s3::Client::from_conf(s3_builder.build());

    // --- Initialize core service ---
    let service = AggregationService::new(
        Arc::new(S3BlobStore::new(client)),
        AggregationSettings {
            source_bucket: cfg.source_bucket.clone(),
            dest_bucket: cfg.dest_bucket.clone(),
            merge_prefix: cfg.merge_prefix.clone(),
            limits: AggregationLimits {
                merge: cfg.max_merge_files,
                pack: cfg.max_pack_files,
            },
        },
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

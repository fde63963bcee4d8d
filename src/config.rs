use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub source_bucket: String,
    pub dest_bucket: String,
    pub merge_prefix: String,
    pub max_merge_files: usize,
    pub max_pack_files: usize,
    pub s3_endpoint: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Date-scoped object aggregation API")]
pub struct Args {
    /// Host to bind to (overrides AGGREGATOR_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides AGGREGATOR_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket the candidates are listed from (overrides AGGREGATOR_SOURCE_BUCKET)
    #[arg(long)]
    pub source_bucket: Option<String>,

    /// Bucket artifacts are published to (overrides AGGREGATOR_DEST_BUCKET;
    /// defaults to the source bucket)
    #[arg(long)]
    pub dest_bucket: Option<String>,

    /// Key prefix the merge mode lists under (overrides AGGREGATOR_MERGE_PREFIX)
    #[arg(long)]
    pub merge_prefix: Option<String>,

    /// Candidate limit for workbook merging (overrides AGGREGATOR_MAX_MERGE_FILES)
    #[arg(long)]
    pub max_merge_files: Option<usize>,

    /// Candidate limit for archive packing (overrides AGGREGATOR_MAX_PACK_FILES)
    #[arg(long)]
    pub max_pack_files: Option<usize>,

    /// Custom S3 endpoint, e.g. a MinIO deployment (overrides AGGREGATOR_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("AGGREGATOR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("AGGREGATOR_PORT", 3000u16)?;
        let env_source = env::var("AGGREGATOR_SOURCE_BUCKET").ok();
        let env_dest = env::var("AGGREGATOR_DEST_BUCKET").ok();
        let env_prefix = env::var("AGGREGATOR_MERGE_PREFIX").unwrap_or_else(|_| "input/".into());
        let env_max_merge = parse_env("AGGREGATOR_MAX_MERGE_FILES", 20usize)?;
        let env_max_pack = parse_env("AGGREGATOR_MAX_PACK_FILES", 100usize)?;
        let env_endpoint = env::var("AGGREGATOR_S3_ENDPOINT").ok();

        // --- Merge ---
        let Some(source_bucket) = args.source_bucket.or(env_source) else {
            bail!("source bucket is required: set AGGREGATOR_SOURCE_BUCKET or pass --source-bucket");
        };
        let dest_bucket = args
            .dest_bucket
            .or(env_dest)
            .unwrap_or_else(|| source_bucket.clone());

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            source_bucket,
            dest_bucket,
            merge_prefix: args.merge_prefix.unwrap_or(env_prefix),
            max_merge_files: args.max_merge_files.unwrap_or(env_max_merge),
            max_pack_files: args.max_pack_files.unwrap_or(env_max_pack),
            s3_endpoint: args.s3_endpoint.or(env_endpoint),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read an env var and parse it, falling back to `default` when absent.
fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).context(format!("reading {}", name)),
    }
}

//! Blob-store access behind a narrow trait.
//!
//! The pipeline only ever needs four operations: list a bucket (optionally
//! under a prefix), fetch a whole object, publish a buffer, and presign a
//! GET. Keeping them behind `BlobStore` lets the pipeline run against the
//! real S3 client in production and an in-memory fake in tests.

use crate::models::object::ObjectSummary;
use async_trait::async_trait;
use aws_sdk_s3::{presigning::PresigningConfig, primitives::ByteStream};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("blob store request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BlobStoreError {
    fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}

pub type BlobStoreResult<T> = Result<T, BlobStoreError>;

/// The four blob-store operations the aggregation pipeline depends on.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List every object in `bucket`, optionally restricted to `prefix`,
    /// flattened across listing pages in listing order.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> BlobStoreResult<Vec<ObjectSummary>>;

    /// Fetch one object's full content. The body is drained completely
    /// before returning; callers never see a partial read.
    async fn get_object(&self, bucket: &str, key: &str) -> BlobStoreResult<Bytes>;

    /// Write a buffer to `bucket`/`key`, overwriting any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> BlobStoreResult<()>;

    /// Issue a time-limited, credential-free GET URL for an object.
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> BlobStoreResult<String>;
}

/// Production backend on the AWS SDK.
#[derive(Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> BlobStoreResult<Vec<ObjectSummary>> {
        let mut summaries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket);
            if let Some(prefix) = prefix {
                req = req.prefix(prefix);
            }
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let page = req.send().await.map_err(BlobStoreError::transport)?;

            for obj in page.contents() {
                let Some(key) = obj.key() else { continue };
                summaries.push(ObjectSummary {
                    key: key.to_string(),
                    last_modified: obj.last_modified().and_then(to_chrono),
                });
            }

            continuation = page.next_continuation_token().map(str::to_string);
            if page.is_truncated() != Some(true) || continuation.is_none() {
                break;
            }
        }

        Ok(summaries)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BlobStoreResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_no_such_key())
                {
                    BlobStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    BlobStoreError::transport(err)
                }
            })?;

        let collected = resp
            .body
            .collect()
            .await
            .map_err(BlobStoreError::transport)?;
        Ok(collected.into_bytes())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> BlobStoreResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(BlobStoreError::transport)?;
        Ok(())
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> BlobStoreResult<String> {
        let config =
            PresigningConfig::expires_in(expires_in).map_err(BlobStoreError::transport)?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(BlobStoreError::transport)?;
        Ok(presigned.uri().to_string())
    }
}

/// SDK timestamps carry epoch seconds + nanos; out-of-range values (which
/// S3 does not produce) collapse to `None` and fail the date filter.
fn to_chrono(instant: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(instant.secs(), instant.subsec_nanos())
}

#[cfg(test)]
pub use memory::MemoryBlobStore;

#[cfg(test)]
mod memory {
    //! BTreeMap-backed fake used by pipeline tests. Also counts list/get
    //! calls so tests can pin the "no I/O before validation" and "no fetch
    //! past the bounds guard" properties.

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct StoredObject {
        bytes: Bytes,
        content_type: String,
        last_modified: DateTime<Utc>,
    }

    #[derive(Default)]
    pub struct MemoryBlobStore {
        objects: Mutex<BTreeMap<(String, String), StoredObject>>,
        list_calls: AtomicUsize,
        get_calls: AtomicUsize,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(
            &self,
            bucket: &str,
            key: &str,
            bytes: impl Into<Bytes>,
            last_modified: DateTime<Utc>,
        ) {
            self.objects.lock().unwrap().insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    bytes: bytes.into(),
                    content_type: "application/octet-stream".into(),
                    last_modified,
                },
            );
        }

        pub fn stored(&self, bucket: &str, key: &str) -> Option<(Bytes, String)> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .map(|obj| (obj.bytes.clone(), obj.content_type.clone()))
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        pub fn get_calls(&self) -> usize {
            self.get_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn list_objects(
            &self,
            bucket: &str,
            prefix: Option<&str>,
        ) -> BlobStoreResult<Vec<ObjectSummary>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let objects = self.objects.lock().unwrap();
            Ok(objects
                .iter()
                .filter(|((b, key), _)| {
                    b == bucket && prefix.is_none_or(|p| key.starts_with(p))
                })
                .map(|((_, key), obj)| ObjectSummary {
                    key: key.clone(),
                    last_modified: Some(obj.last_modified),
                })
                .collect())
        }

        async fn get_object(&self, bucket: &str, key: &str) -> BlobStoreResult<Bytes> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.stored(bucket, key)
                .map(|(bytes, _)| bytes)
                .ok_or_else(|| BlobStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            bytes: Bytes,
            content_type: &str,
        ) -> BlobStoreResult<()> {
            self.objects.lock().unwrap().insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                    last_modified: Utc::now(),
                },
            );
            Ok(())
        }

        async fn presign_get(
            &self,
            bucket: &str,
            key: &str,
            expires_in: Duration,
        ) -> BlobStoreResult<String> {
            Ok(format!(
                "memory://{}/{}?expires={}",
                bucket,
                key,
                expires_in.as_secs()
            ))
        }
    }
}

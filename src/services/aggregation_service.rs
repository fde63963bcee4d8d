//! src/services/aggregation_service.rs
//!
//! AggregationService — the date-bounded object aggregation pipeline:
//! validate → list → filter → bounds check → sequential fetch/transform →
//! finalize → publish → presign. One invocation owns all of its state; the
//! only shared mutable thing is the destination key, where concurrent
//! identical requests are last-write-wins by design.

use crate::models::{
    object::ObjectSummary,
    request::{AggregationMode, AggregationRequest, DateWindow},
};
use crate::services::{
    blob_store::{BlobStore, BlobStoreError},
    transform::{AggregationTransform, CodecError},
};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Presigned download links are valid for one hour.
const LINK_TTL: Duration = Duration::from_secs(3600);

/// Failure taxonomy of one pipeline run. Every state short-circuits here;
/// there are no retries and no partial artifacts.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("no objects listed under the source location")]
    NoCandidatesListed,
    #[error("no `{extension}` objects found between {start} and {end}")]
    NoCandidatesAfterFilter {
        extension: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("found {found} objects, which exceeds the limit of {limit}")]
    TooManyCandidates { found: usize, limit: usize },
    #[error("every matched workbook decoded to zero rows")]
    NoDataFound,
    #[error(transparent)]
    Transport(#[from] BlobStoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type AggregateResult<T> = Result<T, AggregateError>;

/// Upper candidate-count limits, one per mode. Merge cost grows with file
/// count and resident row memory; packing is bounded the same way since an
/// unbounded archive has the same exhaustion risk.
#[derive(Clone, Copy, Debug)]
pub struct AggregationLimits {
    pub merge: usize,
    pub pack: usize,
}

impl AggregationLimits {
    fn for_mode(&self, mode: &AggregationMode) -> usize {
        match mode {
            AggregationMode::TabularMerge => self.merge,
            AggregationMode::ArchivePack { .. } => self.pack,
        }
    }
}

/// Service-level settings the handlers do not vary per request.
#[derive(Clone, Debug)]
pub struct AggregationSettings {
    pub source_bucket: String,
    pub dest_bucket: String,
    /// Prefix the merge mode lists under; archive mode lists the whole bucket.
    pub merge_prefix: String,
    pub limits: AggregationLimits,
}

/// The pipeline, held as axum state. The blob store arrives injected so
/// tests can run the whole flow against an in-memory fake.
#[derive(Clone)]
pub struct AggregationService {
    pub store: Arc<dyn BlobStore>,
    pub settings: AggregationSettings,
}

/// Successful run: user-facing message plus the presigned download link.
#[derive(Debug)]
pub struct AggregationOutcome {
    pub message: String,
    pub download_url: String,
}

impl AggregationService {
    pub fn new(store: Arc<dyn BlobStore>, settings: AggregationSettings) -> Self {
        Self { store, settings }
    }

    /// `GET /merge` entry point: merge `.xlsx` workbooks under the
    /// configured prefix into one workbook.
    pub async fn merge_workbooks(
        &self,
        start_date: Option<String>,
        end_date: Option<String>,
    ) -> AggregateResult<AggregationOutcome> {
        self.aggregate(AggregationRequest {
            start_date,
            end_date,
            mode: AggregationMode::TabularMerge,
            source_bucket: self.settings.source_bucket.clone(),
            dest_bucket: self.settings.dest_bucket.clone(),
            prefix: Some(self.settings.merge_prefix.clone()),
        })
        .await
    }

    /// `GET /compress` entry point: pack matching files into one zip.
    pub async fn pack_archive(
        &self,
        start_date: Option<String>,
        end_date: Option<String>,
        file_type: Option<String>,
    ) -> AggregateResult<AggregationOutcome> {
        let mode = AggregationMode::archive_pack(file_type.as_deref())
            .map_err(|err| AggregateError::InvalidInput(err.to_string()))?;
        self.aggregate(AggregationRequest {
            start_date,
            end_date,
            mode,
            source_bucket: self.settings.source_bucket.clone(),
            dest_bucket: self.settings.dest_bucket.clone(),
            prefix: None,
        })
        .await
    }

    /// Run one aggregation end to end. Dates are validated before any
    /// blob-store call; any failure aborts the whole request.
    pub async fn aggregate(
        &self,
        request: AggregationRequest,
    ) -> AggregateResult<AggregationOutcome> {
        let window =
            DateWindow::parse(request.start_date.as_deref(), request.end_date.as_deref())
                .map_err(|err| AggregateError::InvalidInput(err.to_string()))?;
        let extension = request.mode.extension();

        info!(
            bucket = %request.source_bucket,
            prefix = request.prefix.as_deref().unwrap_or(""),
            extension = %extension,
            start = %window.start,
            end = %window.end,
            "listing aggregation candidates"
        );

        let listed = self
            .store
            .list_objects(&request.source_bucket, request.prefix.as_deref())
            .await?;
        if listed.is_empty() {
            return Err(AggregateError::NoCandidatesListed);
        }

        let candidates = filter_candidates(listed, &window, &extension);
        if candidates.is_empty() {
            return Err(AggregateError::NoCandidatesAfterFilter {
                extension,
                start: window.start,
                end: window.end,
            });
        }

        let limit = self.settings.limits.for_mode(&request.mode);
        if candidates.len() > limit {
            return Err(AggregateError::TooManyCandidates {
                found: candidates.len(),
                limit,
            });
        }

        info!(count = candidates.len(), "aggregating candidate objects");

        // Sequential on purpose: the merge header semantics depend on
        // candidate order, and both modes share one model.
        let mut transform = match &request.mode {
            AggregationMode::TabularMerge => AggregationTransform::tabular_merge(),
            AggregationMode::ArchivePack { .. } => AggregationTransform::archive_pack(),
        };
        for candidate in &candidates {
            let bytes = self
                .store
                .get_object(&request.source_bucket, &candidate.key)
                .await?;
            transform.add(candidate.basename(), &bytes)?;
        }

        let artifact = transform.finalize()?.ok_or(AggregateError::NoDataFound)?;

        let output_key = request.mode.output_key(&window);
        self.store
            .put_object(
                &request.dest_bucket,
                &output_key,
                artifact,
                request.mode.content_type(),
            )
            .await?;
        let download_url = self
            .store
            .presign_get(&request.dest_bucket, &output_key, LINK_TTL)
            .await?;

        info!(key = %output_key, "published aggregation artifact");

        let message = match &request.mode {
            AggregationMode::TabularMerge => {
                format!("Successfully merged {} files.", candidates.len())
            }
            AggregationMode::ArchivePack { file_type } => format!(
                "Successfully compressed {} .{} files.",
                candidates.len(),
                file_type
            ),
        };
        Ok(AggregationOutcome {
            message,
            download_url,
        })
    }
}

/// Keep an object iff its last-modified day lies inside the window and its
/// key carries the required extension. Pure; preserves listing order.
pub fn filter_candidates(
    listed: Vec<ObjectSummary>,
    window: &DateWindow,
    extension: &str,
) -> Vec<ObjectSummary> {
    listed
        .into_iter()
        .filter(|obj| {
            obj.last_modified.is_some_and(|modified| window.contains(modified))
                && has_extension(&obj.key, extension)
        })
        .collect()
}

/// Case-insensitive suffix match, unified across both modes.
fn has_extension(key: &str, extension: &str) -> bool {
    key.to_ascii_lowercase()
        .ends_with(&extension.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::blob_store::MemoryBlobStore;
    use crate::services::transform::test_support::{decoded_rows, workbook_bytes};
    use chrono::{TimeZone, Utc};
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    const SRC: &str = "source-bucket";
    const DST: &str = "dest-bucket";

    fn service(store: Arc<MemoryBlobStore>, limits: AggregationLimits) -> AggregationService {
        AggregationService::new(
            store,
            AggregationSettings {
                source_bucket: SRC.into(),
                dest_bucket: DST.into(),
                merge_prefix: "input/".into(),
                limits,
            },
        )
    }

    fn limits() -> AggregationLimits {
        AggregationLimits { merge: 20, pack: 100 }
    }

    fn in_range() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[tokio::test]
    async fn invalid_dates_fail_before_any_store_call() {
        let store = Arc::new(MemoryBlobStore::new());
        let svc = service(store.clone(), limits());

        let err = svc
            .merge_workbooks(some("2024-1-01"), some("2024-01-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::InvalidInput(_)));

        let err = svc
            .merge_workbooks(some("2024-02-01"), some("2024-01-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::InvalidInput(_)));

        let err = svc.merge_workbooks(None, some("2024-01-31")).await.unwrap_err();
        assert!(matches!(err, AggregateError::InvalidInput(_)));

        assert_eq!(store.list_calls(), 0);
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn empty_listing_and_empty_filter_are_distinct_failures() {
        let store = Arc::new(MemoryBlobStore::new());
        let svc = service(store.clone(), limits());

        let err = svc
            .merge_workbooks(some("2024-01-01"), some("2024-01-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::NoCandidatesListed));

        // Listing is non-empty now, but nothing matches the window.
        let stale = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        store.insert(SRC, "input/old.xlsx", workbook_bytes(&[&["h"]]), stale);

        let err = svc
            .merge_workbooks(some("2024-01-01"), some("2024-01-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::NoCandidatesAfterFilter { .. }));
    }

    #[test]
    fn filtering_is_pure_over_date_range_and_extension() {
        let window = DateWindow::parse(Some("2024-01-10"), Some("2024-01-20")).unwrap();
        let day = |d: u32| Some(Utc.with_ymd_and_hms(2024, 1, d, 8, 0, 0).unwrap());

        let listed = vec![
            ObjectSummary { key: "a.pdf".into(), last_modified: day(10) },
            ObjectSummary { key: "b.PDF".into(), last_modified: day(20) },
            ObjectSummary { key: "early.pdf".into(), last_modified: day(9) },
            ObjectSummary { key: "late.pdf".into(), last_modified: day(21) },
            ObjectSummary { key: "undated.pdf".into(), last_modified: None },
            ObjectSummary { key: "notes.txt".into(), last_modified: day(15) },
        ];

        let kept = filter_candidates(listed, &window, ".pdf");
        let keys: Vec<&str> = kept.iter().map(|c| c.key.as_str()).collect();
        // Inclusive bounds, case-insensitive extension, listing order kept.
        assert_eq!(keys, vec!["a.pdf", "b.PDF"]);
    }

    #[tokio::test]
    async fn merge_concatenates_bodies_under_one_header() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert(
            SRC,
            "input/a.xlsx",
            workbook_bytes(&[&["h1", "h2"], &["1", "2"]]),
            in_range(),
        );
        store.insert(
            SRC,
            "input/b.xlsx",
            workbook_bytes(&[&["h1", "h2"], &["3", "4"]]),
            in_range(),
        );
        // Outside the merge prefix: must not participate.
        store.insert(
            SRC,
            "other/c.xlsx",
            workbook_bytes(&[&["h1", "h2"], &["9", "9"]]),
            in_range(),
        );

        let svc = service(store.clone(), limits());
        let outcome = svc
            .merge_workbooks(some("2024-01-01"), some("2024-01-31"))
            .await
            .unwrap();

        assert_eq!(outcome.message, "Successfully merged 2 files.");
        let key = "output/merged-files-from-2024-01-01-to-2024-01-31.xlsx";
        assert_eq!(
            outcome.download_url,
            format!("memory://{}/{}?expires=3600", DST, key)
        );

        let (bytes, content_type) = store.stored(DST, key).expect("artifact published");
        assert_eq!(
            content_type,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(
            decoded_rows(&bytes),
            vec![
                vec!["h1".to_string(), "h2".to_string()],
                vec!["1".to_string(), "2".to_string()],
                vec!["3".to_string(), "4".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn merge_of_all_empty_workbooks_is_no_data_found() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert(SRC, "input/a.xlsx", workbook_bytes(&[]), in_range());
        store.insert(SRC, "input/b.xlsx", workbook_bytes(&[]), in_range());

        let svc = service(store.clone(), limits());
        let err = svc
            .merge_workbooks(some("2024-01-01"), some("2024-01-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::NoDataFound));

        // No partial artifact may be published on failure.
        let key = "output/merged-files-from-2024-01-01-to-2024-01-31.xlsx";
        assert!(store.stored(DST, key).is_none());
    }

    #[tokio::test]
    async fn bounds_guard_rejects_over_limit_before_any_fetch() {
        let store = Arc::new(MemoryBlobStore::new());
        for name in ["a", "b", "c"] {
            store.insert(
                SRC,
                &format!("input/{}.xlsx", name),
                workbook_bytes(&[&["h"], &["1"]]),
                in_range(),
            );
        }

        let svc = service(
            store.clone(),
            AggregationLimits { merge: 2, pack: 100 },
        );
        let err = svc
            .merge_workbooks(some("2024-01-01"), some("2024-01-31"))
            .await
            .unwrap_err();
        match err {
            AggregateError::TooManyCandidates { found, limit } => {
                assert_eq!((found, limit), (3, 2));
            }
            other => panic!("expected TooManyCandidates, got {:?}", other),
        }
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn bounds_guard_allows_exactly_the_limit() {
        let store = Arc::new(MemoryBlobStore::new());
        for name in ["a", "b"] {
            store.insert(
                SRC,
                &format!("input/{}.xlsx", name),
                workbook_bytes(&[&["h"], &["1"]]),
                in_range(),
            );
        }

        let svc = service(store.clone(), AggregationLimits { merge: 2, pack: 100 });
        let outcome = svc
            .merge_workbooks(some("2024-01-01"), some("2024-01-31"))
            .await
            .unwrap();
        assert_eq!(outcome.message, "Successfully merged 2 files.");
    }

    #[tokio::test]
    async fn pack_round_trips_entries_named_by_basename() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert(SRC, "reports/january.pdf", "first pdf".as_bytes().to_vec(), in_range());
        store.insert(SRC, "scans/deep/february.pdf", "second pdf".as_bytes().to_vec(), in_range());

        let svc = service(store.clone(), limits());
        let outcome = svc
            .pack_archive(some("2024-01-01"), some("2024-01-31"), None)
            .await
            .unwrap();
        assert_eq!(outcome.message, "Successfully compressed 2 .pdf files.");

        let key = "compressed/pdf-files-from-2024-01-01-to-2024-01-31.zip";
        let (bytes, content_type) = store.stored(DST, key).expect("artifact published");
        assert_eq!(content_type, "application/zip");

        let mut archive = ZipArchive::new(Cursor::new(bytes.as_ref())).unwrap();
        assert_eq!(archive.len(), 2);
        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).unwrap();
            entries.push((entry.name().to_string(), buf));
        }
        entries.sort();
        assert_eq!(
            entries,
            vec![
                ("february.pdf".to_string(), b"second pdf".to_vec()),
                ("january.pdf".to_string(), b"first pdf".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn pack_rejects_path_escaping_file_type_before_any_store_call() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert(SRC, "a.pdf", b"pdf".to_vec(), in_range());

        let svc = service(store.clone(), limits());
        let err = svc
            .pack_archive(some("2024-01-01"), some("2024-01-31"), some("../escape"))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::InvalidInput(_)));
        assert_eq!(store.list_calls(), 0);
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn pack_honors_custom_file_type() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert(SRC, "a.docx", b"doc".to_vec(), in_range());
        store.insert(SRC, "b.pdf", b"pdf".to_vec(), in_range());

        let svc = service(store.clone(), limits());
        let outcome = svc
            .pack_archive(some("2024-01-01"), some("2024-01-31"), some("docx"))
            .await
            .unwrap();
        assert_eq!(outcome.message, "Successfully compressed 1 .docx files.");

        let key = "compressed/docx-files-from-2024-01-01-to-2024-01-31.zip";
        assert!(store.stored(DST, key).is_some());
    }

    #[tokio::test]
    async fn repeated_requests_overwrite_the_same_key_with_equal_content() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert(
            SRC,
            "input/a.xlsx",
            workbook_bytes(&[&["h"], &["1"]]),
            in_range(),
        );

        let svc = service(store.clone(), limits());
        let first = svc
            .merge_workbooks(some("2024-01-01"), some("2024-01-31"))
            .await
            .unwrap();
        let key = "output/merged-files-from-2024-01-01-to-2024-01-31.xlsx";
        let (first_bytes, _) = store.stored(DST, key).unwrap();

        let second = svc
            .merge_workbooks(some("2024-01-01"), some("2024-01-31"))
            .await
            .unwrap();
        let (second_bytes, _) = store.stored(DST, key).unwrap();

        assert_eq!(first.message, second.message);
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(
            decoded_rows(&first_bytes),
            vec![vec!["h".to_string()], vec!["1".to_string()]]
        );
    }
}

//! The aggregation request: date window, mode, and source/destination.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Inclusive calendar-day window an aggregation run covers.
///
/// Both bounds must arrive in exact `YYYY-MM-DD` form and be real calendar
/// dates. Parsing happens before any blob-store I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateWindowError {
    #[error("Please provide both startDate and endDate in YYYY-MM-DD format.")]
    Malformed,
    #[error("startDate {start} must not be later than endDate {end}.")]
    Inverted { start: NaiveDate, end: NaiveDate },
}

impl DateWindow {
    /// Parse and validate both bounds. Missing values, format deviations,
    /// impossible dates, and inverted windows are all rejected here.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, DateWindowError> {
        let start = start
            .and_then(parse_day)
            .ok_or(DateWindowError::Malformed)?;
        let end = end.and_then(parse_day).ok_or(DateWindowError::Malformed)?;
        if start > end {
            return Err(DateWindowError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Whether the instant's UTC calendar day falls within the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let day = instant.date_naive();
        self.start <= day && day <= self.end
    }
}

/// Exact-shape `YYYY-MM-DD` parse: ten bytes, dashes at 4 and 7, digits
/// elsewhere, and a valid calendar date.
fn parse_day(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    if !bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
    {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Which transform the pipeline runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AggregationMode {
    /// Concatenate workbook rows under a single shared header.
    TabularMerge,
    /// Pack each object into one compressed archive.
    ArchivePack { file_type: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Please provide fileType using ASCII letters and digits only.")]
pub struct FileTypeError;

impl AggregationMode {
    /// Build the archive mode from an optional `fileType` query value.
    /// A leading dot is tolerated (`.pdf` ≡ `pdf`); absent means `pdf`.
    ///
    /// The value flows into the destination key, so anything beyond ASCII
    /// letters and digits is rejected (`fileType=../x` must not escape the
    /// `compressed/` prefix).
    pub fn archive_pack(file_type: Option<&str>) -> Result<Self, FileTypeError> {
        let file_type = match file_type
            .map(|v| v.trim_start_matches('.'))
            .filter(|v| !v.is_empty())
        {
            None => "pdf",
            Some(v) if v.chars().all(|c| c.is_ascii_alphanumeric()) => v,
            Some(_) => return Err(FileTypeError),
        };
        Ok(Self::ArchivePack {
            file_type: file_type.to_string(),
        })
    }

    /// Required key suffix, including the leading dot.
    pub fn extension(&self) -> String {
        match self {
            Self::TabularMerge => ".xlsx".to_string(),
            Self::ArchivePack { file_type } => format!(".{}", file_type),
        }
    }

    /// Deterministic destination key for the artifact. Repeating a request
    /// overwrites the same key.
    pub fn output_key(&self, window: &DateWindow) -> String {
        let (start, end) = (
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d"),
        );
        match self {
            Self::TabularMerge => {
                format!("output/merged-files-from-{}-to-{}.xlsx", start, end)
            }
            Self::ArchivePack { file_type } => {
                format!(
                    "compressed/{}-files-from-{}-to-{}.zip",
                    file_type, start, end
                )
            }
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::TabularMerge => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            Self::ArchivePack { .. } => "application/zip",
        }
    }
}

/// One aggregation run, fully described. Date bounds stay raw here so the
/// pipeline owns validation (and its failure classification).
#[derive(Clone, Debug)]
pub struct AggregationRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub mode: AggregationMode,
    pub source_bucket: String,
    pub dest_bucket: String,
    /// Key prefix to list under; `None` lists the whole bucket.
    pub prefix: Option<String>,
}

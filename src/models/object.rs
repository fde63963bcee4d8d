//! Represents an object summary returned by a blob-store listing.

use chrono::{DateTime, Utc};

/// A single entry from a bucket listing: the candidate unit of aggregation.
///
/// Summaries are produced per listing call and discarded after filtering;
/// the object's content is fetched separately, by key.
#[derive(Clone, Debug)]
pub struct ObjectSummary {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// When the object was last modified. Listings can omit this; objects
    /// without it never pass the date filter.
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectSummary {
    /// The final path segment of the key, used to name archive entries.
    pub fn basename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

use crate::domain::envelope::Category;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body written for every archived message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl ArchiveRecord {
    /// Object key `{device_id}/{category}/{timestamp}.json`
    ///
    /// Colons are replaced so the key stays a valid file name on every platform.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}.json",
            self.device_id,
            self.category,
            self.timestamp.format("%Y-%m-%dT%H-%M-%S%.6fZ")
        )
    }
}

/// Listing entry returned by the archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Raw-object archive backend, bound to one bucket
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Store `body` under `key`, replacing any existing object
    async fn put(&self, key: &str, body: bytes::Bytes) -> DomainResult<()>;

    /// List objects whose key starts with `prefix`
    ///
    /// Without `recursive`, only keys with no further `/` after the prefix are returned.
    async fn list(&self, prefix: &str, recursive: bool) -> DomainResult<Vec<ArchiveObject>>;
}

/// Whether `key` belongs in a listing of `prefix`
pub fn matches_listing(key: &str, prefix: &str, recursive: bool) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => recursive || !rest.trim_start_matches('/').contains('/'),
        None => false,
    }
}

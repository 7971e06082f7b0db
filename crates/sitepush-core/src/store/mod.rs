//! Remote object storage abstraction
//!
//! The sweep and the publish flow only ever talk to a [`RemoteStore`]. The
//! concrete OSS client lives in [`oss`]; [`memory`] keeps everything in
//! process and records every call, which is what the tests drive.

pub mod memory;
pub mod oss;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::{MemoryStore, StoreCall};
pub use oss::OssStore;

/// One object as reported by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Object key, unique within one listing snapshot
    pub name: String,
    /// Modification time reported by the store
    pub last_modified: DateTime<Utc>,
}

impl RemoteObject {
    pub fn new(name: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            last_modified,
        }
    }

    /// Modification time in milliseconds since the Unix epoch.
    pub fn last_modified_ms(&self) -> i64 {
        self.last_modified.timestamp_millis()
    }
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    /// More objects follow; continue from `next_marker`
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// Metadata of a fetched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {name}")]
    NotFound { name: String },

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned HTTP {status}: {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("failed to read local file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Object storage operations used by publishing and the retention sweep.
///
/// Calls are issued strictly one after another by the callers in this crate;
/// implementations do not need to handle concurrent use from one sweep.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human-readable target name (the bucket), used in prompts.
    fn name(&self) -> &str;

    /// List one page of objects, starting after `marker`.
    async fn list(&self, marker: Option<&str>) -> StoreResult<ListPage>;

    /// Fetch an object's metadata. Missing objects yield [`StoreError::NotFound`].
    async fn get(&self, name: &str) -> StoreResult<ObjectHead>;

    async fn delete(&self, name: &str) -> StoreResult<()>;

    async fn delete_multi(&self, names: &[String]) -> StoreResult<()>;

    /// Upload the file at `local_path` under `name`.
    async fn put(&self, name: &str, local_path: &Path) -> StoreResult<()>;

    /// Configure static website hosting with the given entry documents.
    async fn put_website(&self, index_page: &str, error_page: &str) -> StoreResult<()>;
}

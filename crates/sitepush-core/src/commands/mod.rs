//! High-level commands for sitepush operations.
//!
//! Each command is split into phases so a frontend can confirm with the
//! operator between looking and touching: a `collect`/preview step that only
//! reads, then an `execute` step that deletes or uploads.

pub mod publish;
pub mod remove;
pub mod ssh_publish;

use chrono::{DateTime, FixedOffset};

use crate::retention::RetentionPolicy;

pub use publish::{PublishCommand, PublishOptions, PublishPreview, PublishProgress, PublishReport};
pub use remove::{RemoveCommand, RemoveReport};
pub use ssh_publish::{SshPublishCommand, SshPublishPreview, SshPublishReport};

/// What a sweep is about to treat as expired, in local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPreview {
    pub skip_previous: bool,
    /// Rounded publish time of the live version
    pub previous_publish: Option<DateTime<FixedOffset>>,
    /// Files modified before this are removed
    pub expiration_date: DateTime<FixedOffset>,
    /// Approximate age of the cutoff in days, for display
    pub duration_days: i64,
}

impl RetentionPreview {
    pub async fn resolve(policy: &mut RetentionPolicy<'_>) -> Self {
        Self {
            skip_previous: policy.skip_previous(),
            previous_publish: policy.previous_publish_date().await,
            expiration_date: policy.expiration_date().await,
            duration_days: policy.effective_duration_days().await,
        }
    }

    /// Whether the live version is being protected from this sweep.
    pub fn protects_previous(&self) -> bool {
        self.skip_previous && self.previous_publish.is_some()
    }
}

/// Display format for dates shown to the operator.
pub fn format_local(date: &DateTime<FixedOffset>) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}

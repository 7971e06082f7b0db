//! Publish command implementation.
//!
//! A full publish points the bucket's website config at the entry documents,
//! deletes the live entry documents, optionally sweeps expired files, then
//! uploads the whole local tree. An upload-only publish skips the deletions.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, FixedOffset};

use crate::config::{Section, Settings};
use crate::publish::{OssPublisher, PublishEntry, PublishSet};
use crate::retention::{Clock, RetentionPolicy, RetentionSettings};
use crate::store::RemoteStore;
use crate::sweep::RemovalSweep;

use super::RetentionPreview;

/// Options for the publish command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Local directory to upload
    pub path: PathBuf,
    pub retention: RetentionSettings,
    /// Sweep expired files before uploading
    pub auto_remove: bool,
    /// Only set the website config and upload; never delete
    pub upload_only: bool,
    /// Delete expired batches while listing instead of after a preview
    pub stream_removal: bool,
}

impl PublishOptions {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            path: settings.publish_path(),
            retention: RetentionSettings::from_settings(settings)?,
            auto_remove: settings.auto_remove,
            upload_only: false,
            stream_removal: false,
        })
    }

    /// Options for an upload without any deletion.
    pub fn upload_only(settings: &Settings) -> anyhow::Result<Self> {
        let oss = settings.oss()?;
        Ok(Self {
            path: settings.publish_path(),
            retention: RetentionSettings {
                duration_ms: settings.duration_ms(),
                skip_previous: settings.skip_previous,
                index_page: oss.index_page.clone(),
                error_page: oss.error_page.clone(),
            },
            auto_remove: false,
            upload_only: true,
            stream_removal: false,
        })
    }

    pub fn with_stream_removal(mut self, stream_removal: bool) -> Self {
        self.stream_removal = stream_removal;
        self
    }

    fn sweeps(&self) -> bool {
        self.auto_remove && !self.upload_only
    }
}

/// What a publish is about to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPreview {
    pub bucket: String,
    pub path: PathBuf,
    pub file_count: usize,
    /// Set when expired files will be removed
    pub retention: Option<RetentionPreview>,
    /// Known only when removals were collected up front
    pub remove_count: Option<usize>,
}

/// Progress of the mutating phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishProgress {
    Removing { done: usize, total: usize },
    Uploading { done: usize, total: usize },
}

/// Report from a publish operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub bucket: String,
    pub uploaded: usize,
    pub removed: usize,
}

/// Publish command orchestrator
pub struct PublishCommand<'a> {
    bucket: String,
    options: PublishOptions,
    publisher: OssPublisher<'a>,
    sweep: RemovalSweep<'a>,
    entries: Vec<PublishEntry>,
}

impl<'a> PublishCommand<'a> {
    pub fn required_sections(upload_only: bool) -> &'static [Section] {
        if upload_only {
            &[Section::Path, Section::Oss]
        } else {
            &[
                Section::Oss,
                Section::Path,
                Section::Duration,
                Section::AutoRemove,
                Section::SkipPrevious,
            ]
        }
    }

    pub fn new(store: &'a dyn RemoteStore, options: PublishOptions) -> Self {
        let policy = RetentionPolicy::new(store, options.retention.clone());
        Self::with_policy(store, options, policy)
    }

    pub fn with_clock(
        store: &'a dyn RemoteStore,
        options: PublishOptions,
        clock: impl Clock + 'a,
    ) -> Self {
        let policy = RetentionPolicy::new(store, options.retention.clone()).with_clock(clock);
        Self::with_policy(store, options, policy)
    }

    fn with_policy(
        store: &'a dyn RemoteStore,
        options: PublishOptions,
        policy: RetentionPolicy<'a>,
    ) -> Self {
        let publisher = OssPublisher::new(
            store,
            options.retention.index_page.clone(),
            options.retention.error_page.clone(),
        );
        Self {
            bucket: store.name().to_string(),
            publisher,
            sweep: RemovalSweep::new(store, policy),
            options,
            entries: Vec::new(),
        }
    }

    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    pub fn entries(&self) -> &[PublishEntry] {
        &self.entries
    }

    /// Publish time of the live version, in local time.
    pub async fn last_publish_at(&mut self) -> Option<DateTime<FixedOffset>> {
        self.sweep.policy_mut().previous_publish_date().await
    }

    /// Walk the publish directory and, when sweeping, list expired files.
    pub async fn collect(&mut self) -> anyhow::Result<PublishPreview> {
        let path = &self.options.path;
        self.entries = PublishSet::new(path)
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read publish directory {}", path.display()))?;
        tracing::info!(files = self.entries.len(), path = %path.display(), "collected publish set");

        let mut remove_count = None;
        if self.options.sweeps() && !self.options.stream_removal {
            let count = self
                .sweep
                .collect()
                .await
                .with_context(|| format!("Failed to list objects in {}", self.bucket))?;
            remove_count = Some(count);
        }

        let retention = if self.options.sweeps() && remove_count != Some(0) {
            Some(RetentionPreview::resolve(self.sweep.policy_mut()).await)
        } else {
            None
        };

        Ok(PublishPreview {
            bucket: self.bucket.clone(),
            path: self.options.path.clone(),
            file_count: self.entries.len(),
            retention,
            remove_count,
        })
    }

    pub async fn execute(&mut self) -> anyhow::Result<PublishReport> {
        self.execute_with_progress(|_| {}).await
    }

    /// Upload what [`collect`](Self::collect) found.
    pub async fn execute_with_progress(
        &mut self,
        mut progress: impl FnMut(PublishProgress),
    ) -> anyhow::Result<PublishReport> {
        self.publisher
            .put_config()
            .await
            .with_context(|| format!("Failed to update website config of {}", self.bucket))?;

        let mut removed = 0;
        if !self.options.upload_only {
            self.publisher
                .replace_entry_pages()
                .await
                .with_context(|| format!("Failed to remove entry pages from {}", self.bucket))?;

            if self.options.sweeps() {
                let result = if self.options.stream_removal {
                    self.sweep.sweep().await
                } else {
                    self.sweep
                        .remove_files_with_progress(|done, total| {
                            progress(PublishProgress::Removing { done, total })
                        })
                        .await
                };
                removed = result.with_context(|| {
                    format!("Failed to remove expired files from {}", self.bucket)
                })?;
            }
        }

        let uploaded = self
            .publisher
            .put_files_with_progress(&self.entries, |done, total| {
                progress(PublishProgress::Uploading { done, total })
            })
            .await
            .with_context(|| format!("Failed to upload files to {}", self.bucket))?;

        Ok(PublishReport {
            bucket: self.bucket.clone(),
            uploaded,
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OssSettings;
    use crate::retention::FixedClock;
    use crate::store::{MemoryStore, StoreCall};
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn settings(dir: &TempDir, auto_remove: bool) -> Settings {
        Settings {
            path: Some(dir.path().to_path_buf()),
            duration: Some(86_400),
            auto_remove,
            skip_previous: true,
            oss: Some(OssSettings {
                bucket: "site".to_string(),
                access_key_id: "id".to_string(),
                access_key_secret: "secret".to_string(),
                ..OssSettings::default()
            }),
            ..Settings::default()
        }
    }

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        fs::write(dir.path().join("assets/app.js"), "1").unwrap();
        dir
    }

    #[test]
    fn test_required_sections_depend_on_mode() {
        assert_eq!(PublishCommand::required_sections(false).len(), 5);
        assert_eq!(
            PublishCommand::required_sections(true),
            &[Section::Path, Section::Oss]
        );
    }

    #[tokio::test]
    async fn test_publish_without_auto_remove() {
        let dir = site();
        let store = MemoryStore::new("site");
        store.insert("old.js", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let options = PublishOptions::from_settings(&settings(&dir, false)).unwrap();
        let mut command = PublishCommand::new(&store, options);

        let preview = command.collect().await.unwrap();
        assert_eq!(preview.file_count, 2);
        assert!(preview.retention.is_none());
        assert_eq!(preview.remove_count, None);

        let report = command.execute().await.unwrap();
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.removed, 0);
        assert!(store.contains("old.js"));
        assert_eq!(
            store.calls()[..2],
            [
                StoreCall::PutWebsite {
                    index_page: "index.html".to_string(),
                    error_page: "index.html".to_string(),
                },
                StoreCall::Delete {
                    name: "index.html".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_with_auto_remove_keeps_previous_version() {
        let dir = site();
        let store = MemoryStore::new("site");
        let live = Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 0).unwrap();
        store.insert("index.html", live);
        store.insert("assets/live.js", live);
        store.insert("assets/older.js", Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap());
        let clock = FixedClock::utc(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let options = PublishOptions::from_settings(&settings(&dir, true)).unwrap();
        let mut command = PublishCommand::with_clock(&store, options, clock);

        let preview = command.collect().await.unwrap();
        assert_eq!(preview.remove_count, Some(1));
        assert!(preview.retention.as_ref().unwrap().protects_previous());

        let mut events = Vec::new();
        let report = command
            .execute_with_progress(|event| events.push(event))
            .await
            .unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.uploaded, 2);
        assert!(!store.contains("assets/older.js"));
        assert!(store.contains("assets/live.js"));
        assert_eq!(events[0], PublishProgress::Removing { done: 1, total: 1 });
        assert_eq!(events.last(), Some(&PublishProgress::Uploading { done: 2, total: 2 }));
    }

    #[tokio::test]
    async fn test_streaming_removal_skips_preview_listing() {
        let dir = site();
        let store = MemoryStore::new("site");
        store.insert("old.js", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let options = PublishOptions::from_settings(&settings(&dir, true))
            .unwrap()
            .with_stream_removal(true);
        let mut command = PublishCommand::new(&store, options);

        let preview = command.collect().await.unwrap();
        assert_eq!(preview.remove_count, None);
        assert_eq!(store.list_calls(), 0);

        let report = command.execute().await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(!store.contains("old.js"));
    }

    #[tokio::test]
    async fn test_upload_only_never_deletes() {
        let dir = site();
        let store = MemoryStore::new("site");
        store.insert("old.js", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let options = PublishOptions::upload_only(&settings(&dir, true)).unwrap();
        let mut command = PublishCommand::new(&store, options);

        command.collect().await.unwrap();
        command.execute().await.unwrap();

        assert!(store.contains("old.js"));
        assert!(store.calls().iter().all(|call| !matches!(
            call,
            StoreCall::Delete { .. } | StoreCall::DeleteMulti { .. } | StoreCall::List { .. }
        )));
    }

    #[tokio::test]
    async fn test_last_publish_at() {
        let dir = site();
        let store = MemoryStore::new("site");
        let options = PublishOptions::from_settings(&settings(&dir, false)).unwrap();
        let mut command = PublishCommand::new(&store, options.clone());
        assert_eq!(command.last_publish_at().await, None);

        store.insert("index.html", Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 0).unwrap());
        let mut command = PublishCommand::with_clock(
            &store,
            options,
            FixedClock::utc(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
        );
        let last = command.last_publish_at().await.unwrap();
        assert_eq!(last.to_rfc3339(), "2024-05-10T08:00:00+00:00");
    }
}

//! Standalone expiration sweep.

use anyhow::Context;

use crate::config::{Section, Settings};
use crate::retention::{Clock, RetentionPolicy, RetentionSettings};
use crate::store::RemoteStore;
use crate::sweep::RemovalSweep;

use super::RetentionPreview;

/// Report from a remove operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReport {
    pub bucket: String,
    pub removed: usize,
}

/// Remove command orchestrator
pub struct RemoveCommand<'a> {
    bucket: String,
    sweep: RemovalSweep<'a>,
}

impl<'a> RemoveCommand<'a> {
    pub fn required_sections() -> &'static [Section] {
        &[Section::Oss, Section::Duration, Section::SkipPrevious]
    }

    pub fn new(store: &'a dyn RemoteStore, policy: RetentionPolicy<'a>) -> Self {
        Self {
            bucket: store.name().to_string(),
            sweep: RemovalSweep::new(store, policy),
        }
    }

    pub fn from_settings(store: &'a dyn RemoteStore, settings: &Settings) -> anyhow::Result<Self> {
        let retention = RetentionSettings::from_settings(settings)?;
        Ok(Self::new(store, RetentionPolicy::new(store, retention)))
    }

    /// Same command judged against another clock.
    pub fn with_clock(
        store: &'a dyn RemoteStore,
        settings: &Settings,
        clock: impl Clock + 'a,
    ) -> anyhow::Result<Self> {
        let retention = RetentionSettings::from_settings(settings)?;
        Ok(Self::new(
            store,
            RetentionPolicy::new(store, retention).with_clock(clock),
        ))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Resolve the window without listing anything.
    pub async fn retention(&mut self) -> RetentionPreview {
        RetentionPreview::resolve(self.sweep.policy_mut()).await
    }

    /// List the bucket and count expired files.
    pub async fn collect(&mut self) -> anyhow::Result<usize> {
        self.sweep
            .collect()
            .await
            .with_context(|| format!("Failed to list objects in {}", self.bucket))
    }

    pub fn file_count(&self) -> usize {
        self.sweep.file_count()
    }

    pub fn is_empty(&self) -> bool {
        self.sweep.is_empty()
    }

    pub async fn execute(&mut self) -> anyhow::Result<RemoveReport> {
        self.execute_with_progress(|_, _| {}).await
    }

    /// Delete what [`collect`](Self::collect) found.
    pub async fn execute_with_progress(
        &mut self,
        progress: impl FnMut(usize, usize),
    ) -> anyhow::Result<RemoveReport> {
        let removed = self
            .sweep
            .remove_files_with_progress(progress)
            .await
            .with_context(|| format!("Failed to remove expired files from {}", self.bucket))?;
        Ok(RemoveReport {
            bucket: self.bucket.clone(),
            removed,
        })
    }

    /// List and delete in one pass, without a separate confirmation step.
    pub async fn sweep(&mut self) -> anyhow::Result<RemoveReport> {
        let removed = self
            .sweep
            .sweep()
            .await
            .with_context(|| format!("Failed to sweep expired files from {}", self.bucket))?;
        Ok(RemoveReport {
            bucket: self.bucket.clone(),
            removed,
        })
    }
}

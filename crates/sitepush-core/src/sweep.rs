//! Expiration sweep over a remote store
//!
//! A sweep lists every object page by page, keeps the names older than the
//! retention window and deletes them in batches of [`DELETE_BATCH_SIZE`].
//! Listing and deletion are strictly sequential.

use crate::retention::{RetentionPolicy, RetentionWindow};
use crate::store::{RemoteStore, StoreResult};

/// Names per `delete_multi` request.
pub const DELETE_BATCH_SIZE: usize = 100;

/// Expired object names in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    candidates: Vec<String>,
}

impl SweepResult {
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn count(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn batches(&self) -> std::slice::Chunks<'_, String> {
        self.candidates.chunks(DELETE_BATCH_SIZE)
    }
}

pub struct RemovalSweep<'a> {
    store: &'a dyn RemoteStore,
    policy: RetentionPolicy<'a>,
    result: SweepResult,
    window: Option<RetentionWindow>,
}

impl<'a> RemovalSweep<'a> {
    pub fn new(store: &'a dyn RemoteStore, policy: RetentionPolicy<'a>) -> Self {
        Self {
            store,
            policy,
            result: SweepResult::default(),
            window: None,
        }
    }

    pub fn policy_mut(&mut self) -> &mut RetentionPolicy<'a> {
        &mut self.policy
    }

    /// The window of the last listing, if one ran.
    pub fn window(&self) -> Option<RetentionWindow> {
        self.window
    }

    pub fn result(&self) -> &SweepResult {
        &self.result
    }

    pub fn candidates(&self) -> &[String] {
        self.result.candidates()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.result.count()
    }

    /// List the whole store and record expired names without deleting anything.
    pub async fn collect(&mut self) -> StoreResult<usize> {
        self.scan(false).await?;
        tracing::info!(
            store = self.store.name(),
            expired = self.file_count(),
            "collected expired files"
        );
        Ok(self.file_count())
    }

    /// Delete what [`collect`](Self::collect) found. Nothing happens before a collect.
    pub async fn remove_files(&mut self) -> StoreResult<usize> {
        self.remove_files_with_progress(|_, _| {}).await
    }

    /// Like [`remove_files`](Self::remove_files), reporting `(done, total)` after each batch.
    pub async fn remove_files_with_progress(
        &mut self,
        mut progress: impl FnMut(usize, usize),
    ) -> StoreResult<usize> {
        let total = self.result.count();
        let mut done = 0;
        for (index, batch) in self.result.batches().enumerate() {
            tracing::debug!(batch = index + 1, size = batch.len(), "deleting batch");
            self.store.delete_multi(batch).await?;
            done += batch.len();
            progress(done, total);
        }
        if total > 0 {
            tracing::info!(removed = total, "removed expired files");
        }
        Ok(total)
    }

    /// Collect and delete in one pass, flushing each full batch while listing continues.
    pub async fn sweep(&mut self) -> StoreResult<usize> {
        self.scan(true).await?;
        tracing::info!(
            store = self.store.name(),
            removed = self.file_count(),
            "swept expired files"
        );
        Ok(self.file_count())
    }

    async fn scan(&mut self, delete_as_listed: bool) -> StoreResult<()> {
        let window = self.policy.window().await;
        self.window = Some(window);
        self.result = SweepResult::default();
        tracing::debug!(
            reference = window.reference_timestamp,
            boundary = window.expiration_boundary,
            "listing remote objects"
        );

        let store = self.store;
        let mut marker: Option<String> = None;
        let mut flushed = 0;
        let mut page_number = 0;
        loop {
            let page = store.list(marker.as_deref()).await?;
            page_number += 1;

            let before = self.result.count();
            self.result.candidates.extend(
                page.objects
                    .iter()
                    .filter(|object| window.is_expired(object))
                    .map(|object| object.name.clone()),
            );
            tracing::debug!(
                page = page_number,
                listed = page.objects.len(),
                expired = self.result.count() - before,
                "classified page"
            );

            if delete_as_listed {
                while self.result.count() - flushed >= DELETE_BATCH_SIZE {
                    let batch = &self.result.candidates[flushed..flushed + DELETE_BATCH_SIZE];
                    tracing::debug!(size = batch.len(), "deleting batch");
                    store.delete_multi(batch).await?;
                    flushed += DELETE_BATCH_SIZE;
                }
            }

            if !page.is_truncated {
                break;
            }
            marker = page
                .next_marker
                .or_else(|| page.objects.last().map(|object| object.name.clone()));
            if marker.is_none() {
                tracing::warn!(page = page_number, "truncated listing without a marker, stopping");
                break;
            }
        }

        if delete_as_listed && flushed < self.result.count() {
            let batch = &self.result.candidates[flushed..];
            tracing::debug!(size = batch.len(), "deleting final batch");
            store.delete_multi(batch).await?;
        }
        Ok(())
    }
}

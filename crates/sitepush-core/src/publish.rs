//! Local publish set and bucket upload
//!
//! [`PublishSet`] walks the publish directory with an explicit stack and
//! yields one [`PublishEntry`] per regular file, lazily and in sorted
//! depth-first order. Symlinks are followed like any other path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::store::{RemoteStore, StoreResult};

/// A local file and the object name it is uploaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEntry {
    /// `/`-separated path relative to the publish root
    pub remote_path: String,
    pub local_path: PathBuf,
}

/// Single-pass iterator over the files under a publish root.
///
/// A root that does not exist yields nothing.
#[derive(Debug)]
pub struct PublishSet {
    root: PathBuf,
    stack: Vec<PathBuf>,
    started: bool,
}

impl PublishSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stack: Vec::new(),
            started: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Push children so the smallest name is popped first.
    fn push_children(&mut self, dir: &Path) -> io::Result<()> {
        let mut children = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        children.sort();
        self.stack.extend(children.into_iter().rev());
        Ok(())
    }

    fn entry_for(&self, local_path: PathBuf) -> PublishEntry {
        let relative = local_path.strip_prefix(&self.root).unwrap_or(&local_path);
        let remote_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        PublishEntry {
            remote_path,
            local_path,
        }
    }
}

impl Iterator for PublishSet {
    type Item = io::Result<PublishEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            if !self.root.exists() {
                tracing::debug!(root = %self.root.display(), "publish root does not exist");
                return None;
            }
            let root = self.root.clone();
            if let Err(e) = self.push_children(&root) {
                return Some(Err(e));
            }
        }

        while let Some(path) = self.stack.pop() {
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => return Some(Err(e)),
            };
            if metadata.is_dir() {
                if let Err(e) = self.push_children(&path) {
                    return Some(Err(e));
                }
                continue;
            }
            return Some(Ok(self.entry_for(path)));
        }
        None
    }
}

/// Uploads a publish set to a bucket configured as a static website.
pub struct OssPublisher<'a> {
    store: &'a dyn RemoteStore,
    index_page: String,
    error_page: String,
}

impl<'a> OssPublisher<'a> {
    pub fn new(
        store: &'a dyn RemoteStore,
        index_page: impl Into<String>,
        error_page: impl Into<String>,
    ) -> Self {
        Self {
            store,
            index_page: index_page.into(),
            error_page: error_page.into(),
        }
    }

    /// Point the bucket's website configuration at the entry documents.
    pub async fn put_config(&self) -> StoreResult<()> {
        tracing::info!(index = %self.index_page, error = %self.error_page, "updating website config");
        self.store
            .put_website(&self.index_page, &self.error_page)
            .await
    }

    /// Delete the live entry documents so the new upload stamps a fresh publish time.
    pub async fn replace_entry_pages(&self) -> StoreResult<()> {
        if self.index_page == self.error_page {
            tracing::debug!(name = %self.index_page, "deleting entry page");
            self.store.delete(&self.index_page).await
        } else {
            tracing::debug!(index = %self.index_page, error = %self.error_page, "deleting entry pages");
            self.store
                .delete_multi(&[self.index_page.clone(), self.error_page.clone()])
                .await
        }
    }

    pub async fn put_files(&self, entries: &[PublishEntry]) -> StoreResult<usize> {
        self.put_files_with_progress(entries, |_, _| {}).await
    }

    /// Upload every entry in order, reporting `(done, total)` after each file.
    pub async fn put_files_with_progress(
        &self,
        entries: &[PublishEntry],
        mut progress: impl FnMut(usize, usize),
    ) -> StoreResult<usize> {
        let total = entries.len();
        for (index, entry) in entries.iter().enumerate() {
            tracing::trace!(name = %entry.remote_path, "uploading");
            self.store.put(&entry.remote_path, &entry.local_path).await?;
            progress(index + 1, total);
        }
        tracing::info!(uploaded = total, store = self.store.name(), "uploaded files");
        Ok(total)
    }
}

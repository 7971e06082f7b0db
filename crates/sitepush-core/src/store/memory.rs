//! In-process object store.
//!
//! Keeps objects in a sorted map, paginates like a real bucket listing and
//! records every call so callers can assert on request sequences.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ListPage, ObjectHead, RemoteObject, RemoteStore, StoreError, StoreResult};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// A request observed by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List { marker: Option<String> },
    Get { name: String },
    Delete { name: String },
    DeleteMulti { names: Vec<String> },
    Put { name: String },
    PutWebsite { index_page: String, error_page: String },
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, DateTime<Utc>>,
    calls: Vec<StoreCall>,
    website: Option<(String, String)>,
}

#[derive(Debug)]
pub struct MemoryStore {
    bucket: String,
    page_size: usize,
    omit_markers: bool,
    fail_deletes: bool,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: DEFAULT_PAGE_SIZE,
            omit_markers: false,
            fail_deletes: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Number of objects returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Leave `next_marker` out of truncated pages, as buckets listed without
    /// a delimiter do.
    pub fn without_next_marker(mut self) -> Self {
        self.omit_markers = true;
        self
    }

    /// Make every delete request fail with a transport-like status error.
    pub fn with_failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn insert(&self, name: impl Into<String>, last_modified: DateTime<Utc>) {
        self.lock().objects.insert(name.into(), last_modified);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().objects.contains_key(name)
    }

    pub fn object_names(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, StoreCall::List { .. }))
    }

    /// Batches passed to `delete_multi`, in call order.
    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::DeleteMulti { names } => Some(names.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn website(&self) -> Option<(String, String)> {
        self.lock().website.clone()
    }

    fn count_calls(&self, pred: impl Fn(&StoreCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-call; the map is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn delete_failure(&self, operation: &str) -> StoreResult<()> {
        if self.fail_deletes {
            return Err(StoreError::Status {
                operation: operation.to_string(),
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn name(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, marker: Option<&str>) -> StoreResult<ListPage> {
        let mut state = self.lock();
        state.calls.push(StoreCall::List {
            marker: marker.map(str::to_string),
        });

        let mut remaining = state
            .objects
            .iter()
            .filter(|(name, _)| marker.is_none_or(|m| name.as_str() > m));
        let objects: Vec<RemoteObject> = remaining
            .by_ref()
            .take(self.page_size)
            .map(|(name, modified)| RemoteObject::new(name.clone(), *modified))
            .collect();
        let is_truncated = remaining.next().is_some();
        let next_marker = if is_truncated && !self.omit_markers {
            objects.last().map(|o| o.name.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            is_truncated,
            next_marker,
        })
    }

    async fn get(&self, name: &str) -> StoreResult<ObjectHead> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Get {
            name: name.to_string(),
        });
        state
            .objects
            .get(name)
            .map(|modified| ObjectHead {
                name: name.to_string(),
                last_modified: *modified,
            })
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        self.lock().calls.push(StoreCall::Delete {
            name: name.to_string(),
        });
        self.delete_failure("DeleteObject")?;
        self.lock().objects.remove(name);
        Ok(())
    }

    async fn delete_multi(&self, names: &[String]) -> StoreResult<()> {
        self.lock().calls.push(StoreCall::DeleteMulti {
            names: names.to_vec(),
        });
        self.delete_failure("DeleteMultipleObjects")?;
        let mut state = self.lock();
        for name in names {
            state.objects.remove(name);
        }
        Ok(())
    }

    async fn put(&self, name: &str, local_path: &Path) -> StoreResult<()> {
        if !local_path.is_file() {
            return Err(StoreError::Io {
                path: local_path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a file"),
            });
        }
        let mut state = self.lock();
        state.calls.push(StoreCall::Put {
            name: name.to_string(),
        });
        state.objects.insert(name.to_string(), Utc::now());
        Ok(())
    }

    async fn put_website(&self, index_page: &str, error_page: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::PutWebsite {
            index_page: index_page.to_string(),
            error_page: error_page.to_string(),
        });
        state.website = Some((index_page.to_string(), error_page.to_string()));
        Ok(())
    }
}

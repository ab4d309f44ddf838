//! Local preview references and their release bookkeeping
//!
//! A preview reference (`blob:` URL) backs an in-memory copy of a picked file.
//! Each reference created through the tracker is released exactly once: when
//! its field value is superseded, removed or finalized, or at form teardown.

use bytes::Bytes;
use genbi_core::models::RawFile;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Creates and revokes local preview references.
pub trait PreviewBackend: Send + Sync {
    fn create_object_url(&self, file: &RawFile) -> String;

    /// Revoking an unknown reference must be a no-op.
    fn revoke_object_url(&self, url: &str);
}

/// Preview backend keeping file bytes in memory under `blob:genbi/{uuid}` URLs.
#[derive(Debug, Default)]
pub struct InMemoryPreviews {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl InMemoryPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes behind a live reference.
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        lock(&self.objects).get(url).cloned()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.objects).len()
    }
}

impl PreviewBackend for InMemoryPreviews {
    fn create_object_url(&self, file: &RawFile) -> String {
        let url = format!("blob:genbi/{}", Uuid::new_v4());
        lock(&self.objects).insert(url.clone(), file.data.clone());
        url
    }

    fn revoke_object_url(&self, url: &str) {
        lock(&self.objects).remove(url);
    }
}

/// Per-form set of live preview references, with the number of fields
/// holding each one.
///
/// The lock is only taken inside synchronous sections, never across an await.
pub struct ObjectUrlTracker {
    backend: Arc<dyn PreviewBackend>,
    tracked: Mutex<HashMap<String, usize>>,
}

impl ObjectUrlTracker {
    pub fn new(backend: Arc<dyn PreviewBackend>) -> Self {
        Self {
            backend,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Tracker backed by `InMemoryPreviews`.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryPreviews::new()))
    }

    /// Create a preview reference for `file` and track it.
    pub fn create(&self, file: &RawFile) -> String {
        let url = self.backend.create_object_url(file);
        self.register(url.clone());
        url
    }

    /// Count one more holder of `url`, tracking it if it is new.
    pub fn register(&self, url: String) {
        *lock(&self.tracked).entry(url).or_default() += 1;
    }

    /// Release `url` unless it is still displayed somewhere. Returns whether
    /// a release happened.
    pub fn release_if_unused(&self, url: &str, still_active: &HashSet<String>) -> bool {
        if still_active.contains(url) {
            return false;
        }
        self.release(url)
    }

    /// Drop one holder of `url`; the last one revokes it. Returns whether
    /// the reference was revoked. Unknown or already released references
    /// are ignored.
    pub fn release(&self, url: &str) -> bool {
        let revoke = {
            let mut tracked = lock(&self.tracked);
            match tracked.get_mut(url) {
                Some(holders) if *holders > 1 => {
                    *holders -= 1;
                    false
                }
                Some(_) => tracked.remove(url).is_some(),
                None => false,
            }
        };
        if revoke {
            self.backend.revoke_object_url(url);
        }
        revoke
    }

    /// Release every tracked reference. Returns how many were released.
    pub fn release_all(&self) -> usize {
        let drained: Vec<String> = lock(&self.tracked).drain().map(|(url, _)| url).collect();
        for url in &drained {
            self.backend.revoke_object_url(url);
        }
        drained.len()
    }

    pub fn is_tracked(&self, url: &str) -> bool {
        lock(&self.tracked).contains_key(url)
    }

    pub fn tracked(&self) -> HashSet<String> {
        lock(&self.tracked).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.tracked).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ObjectUrlTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectUrlTracker")
            .field("tracked", &self.len())
            .finish()
    }
}

// A poisoned set is still a valid set of strings
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

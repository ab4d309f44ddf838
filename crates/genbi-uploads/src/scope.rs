use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle flags of the owning form, shared with its fields.
///
/// Completions that arrive after teardown check `is_mounted` before touching
/// state. Field edits check `is_submitting`: values are frozen while a submit
/// runs.
#[derive(Debug, Clone)]
pub struct MountScope {
    mounted: Arc<AtomicBool>,
    submitting: Arc<AtomicBool>,
}

impl MountScope {
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
            submitting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Mark as torn down. Returns `false` if it already was.
    pub fn unmount(&self) -> bool {
        self.mounted.swap(false, Ordering::AcqRel)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Enter the submitting state. Returns `false` if a submit already runs.
    pub(crate) fn begin_submit(&self) -> bool {
        !self.submitting.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn end_submit(&self) {
        self.submitting.store(false, Ordering::Release);
    }
}

impl Default for MountScope {
    fn default() -> Self {
        Self::new()
    }
}

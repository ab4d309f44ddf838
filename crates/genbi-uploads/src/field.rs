//! Per-field upload controller
//!
//! One controller backs one form field (a cover image, an attachment list).
//! It validates selections, produces the field value according to the
//! field's `UploadMode`, and keeps preview references and staged artifacts
//! in step with what the field displays.
//!
//! Selections are last-writer-wins per single-file field: every selection,
//! removal or replacement bumps the field epoch, and an upload that lands
//! with an older epoch is discarded instead of applied.

use futures::future::join_all;
use genbi_core::models::{FileOrigin, FinalizedUpload, RawFile, UploadableFile};
use genbi_core::{
    AcceptPattern, ClientError, ErrorMetadata, FileValidator, StagingClient, UploadDefaults,
    UploadError,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::cleanup::{discard_staged, PendingCleanup};
use crate::scope::MountScope;
use crate::tracker::{lock, ObjectUrlTracker};

/// When a selected file is sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Straight to permanent storage on selection.
    Direct,
    /// Local preview only; sent when the form is submitted.
    Deferred,
    /// To temporary storage on selection; made permanent on submit.
    StagedPreview,
}

#[derive(Debug, Clone)]
pub struct FieldConfig {
    /// Payload key, e.g. `coverImage`
    pub key: String,
    /// User-facing name, e.g. `Gambar sampul`
    pub label: String,
    pub max_size_bytes: u64,
    pub accept: AcceptPattern,
    pub multiple: bool,
    pub mode: UploadMode,
    /// Destination folder in permanent storage
    pub folder: String,
}

impl FieldConfig {
    pub fn new(key: impl Into<String>, label: impl Into<String>, mode: UploadMode) -> Self {
        Self::from_defaults(key, label, mode, &UploadDefaults::default())
    }

    pub fn from_defaults(
        key: impl Into<String>,
        label: impl Into<String>,
        mode: UploadMode,
        defaults: &UploadDefaults,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            max_size_bytes: defaults.max_upload_bytes,
            accept: AcceptPattern::any(),
            multiple: false,
            mode,
            folder: defaults.folder.clone(),
        }
    }

    pub fn max_size_bytes(mut self, max: u64) -> Self {
        self.max_size_bytes = max;
        self
    }

    pub fn max_size_mb(self, mb: u64) -> Self {
        self.max_size_bytes(mb * 1024 * 1024)
    }

    pub fn accept(mut self, pattern: &str) -> Self {
        self.accept = AcceptPattern::parse(pattern);
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }
}

/// What the field currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    Idle,
    LocalPreview,
    Uploading,
    Staged,
    /// Only permanent (finalized or previously saved) files
    Stored,
    Error,
}

pub type ChangeListener = Arc<dyn Fn(&[UploadableFile]) + Send + Sync>;

#[derive(Debug, Default)]
struct FieldState {
    files: Vec<UploadableFile>,
    error: Option<String>,
    epoch: u64,
    in_flight: usize,
}

struct FieldInner {
    config: FieldConfig,
    validator: FileValidator,
    state: Mutex<FieldState>,
    listeners: Mutex<Vec<ChangeListener>>,
    tracker: Arc<ObjectUrlTracker>,
    client: Arc<dyn StagingClient>,
    scope: MountScope,
}

/// How an upload result meets the field state it returns to.
enum Landing {
    Unmounted(Option<UploadableFile>),
    Stale(Option<UploadableFile>),
    Applied {
        displaced: Vec<UploadableFile>,
        snapshot: Vec<UploadableFile>,
    },
    Failed(ClientError),
}

/// Upload controller for one form field. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FieldUploadController {
    inner: Arc<FieldInner>,
}

impl FieldUploadController {
    pub fn new(
        config: FieldConfig,
        client: Arc<dyn StagingClient>,
        tracker: Arc<ObjectUrlTracker>,
        scope: MountScope,
    ) -> Self {
        let validator = FileValidator::new(config.max_size_bytes, config.accept.clone());
        Self {
            inner: Arc::new(FieldInner {
                config,
                validator,
                state: Mutex::new(FieldState::default()),
                listeners: Mutex::new(Vec::new()),
                tracker,
                client,
                scope,
            }),
        }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.inner.config
    }

    pub fn key(&self) -> &str {
        &self.inner.config.key
    }

    pub fn value(&self) -> Vec<UploadableFile> {
        lock(&self.inner.state).files.clone()
    }

    /// The value of a single-file field.
    pub fn first(&self) -> Option<UploadableFile> {
        lock(&self.inner.state).files.first().cloned()
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.inner.state).error.clone()
    }

    /// True while an upload is in flight; the drop zone is disabled meanwhile.
    pub fn is_uploading(&self) -> bool {
        lock(&self.inner.state).in_flight > 0
    }

    pub fn status(&self) -> FieldStatus {
        let state = lock(&self.inner.state);
        if state.in_flight > 0 {
            FieldStatus::Uploading
        } else if state.error.is_some() {
            FieldStatus::Error
        } else if state.files.is_empty() {
            FieldStatus::Idle
        } else if state.files.iter().any(|f| f.local_url().is_some()) {
            FieldStatus::LocalPreview
        } else if state.files.iter().any(|f| f.staging_id().is_some()) {
            FieldStatus::Staged
        } else {
            FieldStatus::Stored
        }
    }

    /// Call `listener` with the new value after every value change.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&[UploadableFile]) + Send + Sync + 'static,
    {
        lock(&self.inner.listeners).push(Arc::new(listener));
    }

    /// Attach a picked file.
    ///
    /// Validation runs first; a rejected file sets the field error and
    /// leaves the value untouched without any network call. Fails with
    /// `SubmitInProgress` while the form is being submitted.
    #[tracing::instrument(
        skip(self, file),
        fields(field = %self.inner.config.key, file.name = %file.name, file.size = file.size_bytes())
    )]
    pub async fn select(&self, file: RawFile) -> Result<(), UploadError> {
        if !self.inner.scope.is_mounted() {
            tracing::debug!("Ignoring selection on a torn-down form");
            return Ok(());
        }
        if self.inner.scope.is_submitting() {
            return Err(UploadError::SubmitInProgress);
        }

        if let Err(e) = self
            .inner
            .validator
            .validate(&file.name, &file.mime_type, file.size_bytes())
        {
            tracing::debug!(error = %e, "File rejected");
            lock(&self.inner.state).error = Some(e.to_string());
            return Err(e.into());
        }

        match self.inner.config.mode {
            UploadMode::Deferred => {
                self.attach_local(file);
                Ok(())
            }
            UploadMode::StagedPreview | UploadMode::Direct => self.upload(file).await,
        }
    }

    /// Attach several files (drop of a file list). Single-file fields only
    /// take the first one.
    pub async fn select_many(&self, files: Vec<RawFile>) -> Vec<Result<(), UploadError>> {
        let files: Vec<RawFile> = if self.inner.config.multiple {
            files
        } else {
            files.into_iter().take(1).collect()
        };
        join_all(files.into_iter().map(|file| self.select(file))).await
    }

    fn attach_local(&self, file: RawFile) {
        let url = self.inner.tracker.create(&file);
        let value = UploadableFile::local(file, url);

        let (displaced, snapshot) = {
            let mut state = lock(&self.inner.state);
            let displaced = if self.inner.config.multiple {
                Vec::new()
            } else {
                state.epoch += 1;
                std::mem::take(&mut state.files)
            };
            state.files.push(value);
            state.error = None;
            (displaced, state.files.clone())
        };

        let mut cleanup = PendingCleanup::default();
        self.release_displaced(displaced, &snapshot, &mut cleanup);
        self.notify(&snapshot);
    }

    async fn upload(&self, file: RawFile) -> Result<(), UploadError> {
        let ticket = {
            let mut state = lock(&self.inner.state);
            if !self.inner.config.multiple {
                state.epoch += 1;
            }
            state.in_flight += 1;
            state.error = None;
            state.epoch
        };

        let result = match self.inner.config.mode {
            UploadMode::Direct => self
                .inner
                .client
                .upload_direct(&file, &self.inner.config.folder)
                .await
                .map(|upload| UploadableFile::finalized_from_raw(upload, &file)),
            _ => self
                .inner
                .client
                .upload_to_staging(&file)
                .await
                .map(UploadableFile::staged),
        };

        let landing = {
            let mut state = lock(&self.inner.state);
            state.in_flight = state.in_flight.saturating_sub(1);
            if !self.inner.scope.is_mounted() {
                Landing::Unmounted(result.ok())
            } else if state.epoch != ticket {
                Landing::Stale(result.ok())
            } else {
                match result {
                    Ok(value) => {
                        let displaced = if self.inner.config.multiple {
                            Vec::new()
                        } else {
                            std::mem::take(&mut state.files)
                        };
                        state.files.push(value);
                        state.error = None;
                        Landing::Applied {
                            displaced,
                            snapshot: state.files.clone(),
                        }
                    }
                    Err(e) => {
                        state.error = Some(UploadError::StagingUpload(e.clone()).client_message());
                        Landing::Failed(e)
                    }
                }
            }
        };

        match landing {
            Landing::Unmounted(value) => {
                if let Some(value) = value {
                    self.discard_late(&value).await;
                }
                Ok(())
            }
            Landing::Stale(value) => {
                tracing::debug!(ticket, "Discarding superseded upload");
                if let Some(value) = value {
                    self.discard_late(&value).await;
                }
                Ok(())
            }
            Landing::Applied {
                displaced,
                snapshot,
            } => {
                let mut cleanup = PendingCleanup::default();
                self.release_displaced(displaced, &snapshot, &mut cleanup);
                self.notify(&snapshot);
                Ok(())
            }
            Landing::Failed(e) => {
                tracing::warn!(error = %e, "Upload failed");
                Err(UploadError::StagingUpload(e))
            }
        }
    }

    /// Remove the file at `index`. A staged artifact is deleted in the
    /// background; the returned handle may be awaited or dropped. Ignored
    /// while the form is being submitted.
    pub fn remove(&self, index: usize) -> PendingCleanup {
        let mut cleanup = PendingCleanup::default();
        if self.frozen() {
            return cleanup;
        }
        let removed = {
            let mut state = lock(&self.inner.state);
            if index >= state.files.len() {
                None
            } else {
                if !self.inner.config.multiple {
                    state.epoch += 1;
                }
                let file = state.files.remove(index);
                state.error = None;
                Some((file, state.files.clone()))
            }
        };

        if let Some((file, snapshot)) = removed {
            tracing::debug!(field = %self.inner.config.key, file.name = %file.name, "File removed");
            self.release_displaced(vec![file], &snapshot, &mut cleanup);
            self.notify(&snapshot);
        }
        cleanup
    }

    /// Remove every file and cancel in-flight uploads.
    pub fn clear(&self) -> PendingCleanup {
        self.set_value(Vec::new())
    }

    /// Replace the value, e.g. with the `REMOTE_EXISTING` files of a loaded
    /// record. In-flight uploads are cancelled. Ignored while the form is
    /// being submitted.
    pub fn set_value(&self, files: Vec<UploadableFile>) -> PendingCleanup {
        if self.frozen() {
            return PendingCleanup::default();
        }

        let (displaced, snapshot) = {
            let mut state = lock(&self.inner.state);
            let held = local_urls(&state.files);
            for url in local_urls(&files).difference(&held) {
                self.inner.tracker.register(url.clone());
            }
            state.epoch += 1;
            state.error = None;
            let displaced = std::mem::replace(&mut state.files, files);
            (displaced, state.files.clone())
        };

        let mut cleanup = PendingCleanup::default();
        self.release_displaced(displaced, &snapshot, &mut cleanup);
        self.notify(&snapshot);
        cleanup
    }

    /// Files that still need to reach permanent storage.
    pub fn pending_files(&self) -> Vec<UploadableFile> {
        lock(&self.inner.state)
            .files
            .iter()
            .filter(|f| f.is_pending())
            .cloned()
            .collect()
    }

    /// Local preview references the field currently displays.
    pub fn local_urls(&self) -> HashSet<String> {
        local_urls(&lock(&self.inner.state).files)
    }

    fn frozen(&self) -> bool {
        let frozen = self.inner.scope.is_submitting();
        if frozen {
            tracing::debug!(field = %self.inner.config.key, "Field is read-only while submitting");
        }
        frozen
    }

    /// Swap pending files for their permanent copies. Staging artifacts are
    /// consumed by the finalize, so only local references are released here.
    pub(crate) fn apply_resolved(&self, resolved: &HashMap<String, FinalizedUpload>) -> usize {
        let (displaced, snapshot) = {
            let mut state = lock(&self.inner.state);
            let mut displaced = Vec::new();
            for slot in state.files.iter_mut() {
                let upload = pending_key(slot).and_then(|key| resolved.get(&key));
                if let Some(upload) = upload {
                    let finalized = UploadableFile::finalized(upload.clone(), Some(&*slot));
                    displaced.push(std::mem::replace(slot, finalized));
                }
            }
            (displaced, state.files.clone())
        };

        if displaced.is_empty() {
            return 0;
        }

        let active = local_urls(&snapshot);
        for url in local_urls(&displaced) {
            self.inner.tracker.release_if_unused(&url, &active);
        }
        self.notify(&snapshot);
        displaced.len()
    }

    /// Settle staged files the record endpoint finalized itself.
    ///
    /// Their permanent URLs are read from the saved `record` under the field
    /// key; for multi-file fields, URLs the field did not already hold are
    /// matched to staged files in order. A staged file without a URL in the
    /// record is dropped, its staging id being spent either way.
    pub(crate) fn settle_from_record(&self, record: &Value) -> usize {
        let key = &self.inner.config.key;
        let (settled, dropped, snapshot) = {
            let mut state = lock(&self.inner.state);
            if !state.files.iter().any(|f| f.staging_id().is_some()) {
                return 0;
            }

            let held: HashSet<&str> = state
                .files
                .iter()
                .filter(|f| f.staging_id().is_none())
                .map(|f| f.url.as_str())
                .collect();
            let mut fresh: VecDeque<String> = match record.get(key) {
                Some(Value::String(url)) => VecDeque::from([url.clone()]),
                Some(Value::Array(urls)) => urls
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|url| !held.contains(url))
                    .map(str::to_string)
                    .collect(),
                _ => VecDeque::new(),
            };

            let mut settled = 0;
            let mut dropped = Vec::new();
            for file in std::mem::take(&mut state.files) {
                if file.staging_id().is_none() {
                    state.files.push(file);
                    continue;
                }
                match fresh.pop_front() {
                    Some(url) => {
                        let upload = FinalizedUpload::from_url(url);
                        state.files.push(UploadableFile::finalized(upload, Some(&file)));
                        settled += 1;
                    }
                    None => dropped.push(file.name),
                }
            }
            state.epoch += 1;
            (settled, dropped, state.files.clone())
        };

        if !dropped.is_empty() {
            tracing::warn!(
                field = %key,
                files = ?dropped,
                "Saved record carries no URL for finalized files"
            );
        }
        self.notify(&snapshot);
        settled
    }

    fn release_displaced(
        &self,
        displaced: Vec<UploadableFile>,
        current: &[UploadableFile],
        cleanup: &mut PendingCleanup,
    ) {
        let active = local_urls(current);
        for url in local_urls(&displaced) {
            self.inner.tracker.release_if_unused(&url, &active);
        }

        let active_staged: HashSet<&str> = current.iter().filter_map(|f| f.staging_id()).collect();
        let mut discarded = HashSet::new();
        for file in &displaced {
            if let FileOrigin::Staged { staging_id, .. } = &file.origin {
                if !active_staged.contains(staging_id.as_str()) && discarded.insert(staging_id) {
                    cleanup.discard(self.inner.client.clone(), staging_id.clone());
                }
            }
        }
    }

    /// Drop the result of an upload nobody is waiting for anymore.
    async fn discard_late(&self, value: &UploadableFile) {
        match value.staging_id() {
            Some(staging_id) => discard_staged(self.inner.client.as_ref(), staging_id).await,
            None => tracing::debug!(
                url = %value.url,
                "Superseded direct upload left in permanent storage"
            ),
        }
    }

    fn notify(&self, snapshot: &[UploadableFile]) {
        let listeners: Vec<ChangeListener> = lock(&self.inner.listeners).clone();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

impl std::fmt::Debug for FieldUploadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldUploadController")
            .field("key", &self.inner.config.key)
            .field("mode", &self.inner.config.mode)
            .field("status", &self.status())
            .finish()
    }
}

fn local_urls(files: &[UploadableFile]) -> HashSet<String> {
    files
        .iter()
        .filter_map(|f| f.local_url())
        .map(str::to_string)
        .collect()
}

/// Identity of a pending file within a form session: its staging id, or its
/// local preview reference.
pub(crate) fn pending_key(file: &UploadableFile) -> Option<String> {
    match &file.origin {
        FileOrigin::Staged { staging_id, .. } => Some(staging_id.clone()),
        FileOrigin::LocalPending { .. } => Some(file.url.clone()),
        FileOrigin::Finalized | FileOrigin::RemoteExisting => None,
    }
}

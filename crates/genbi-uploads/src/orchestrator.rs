//! Form-level submit orchestration
//!
//! `UploadForm` owns the fields of one admin form and turns a submit into
//! three phases: collect every pending file, make all of them permanent
//! concurrently, then persist the composed payload. Persistence never runs
//! unless every pending file resolved; a partial failure names the failing
//! fields and leaves every field value untouched.
//!
//! Finalize results are cached for the lifetime of the form, so a retry after
//! a partial failure or a persistence error never re-finalizes a staging id
//! that already succeeded.

use futures::future::join_all;
use genbi_core::models::{FinalizeItem, FinalizedUpload, UploadableFile};
use genbi_core::{
    ClientError, FailedField, PersistTarget, RecordPersistence, StagingClient, UploadError,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::cleanup::discard_staged;
use crate::field::{pending_key, FieldConfig, FieldUploadController};
use crate::scope::MountScope;
use crate::tracker::{lock, ObjectUrlTracker, PreviewBackend};

/// Who promotes staged files to permanent storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalizeStrategy {
    /// The form finalizes staged files before persisting the record.
    #[default]
    ClientSide,
    /// Staged files go out as `{key}TempId` and the record endpoint finalizes them.
    ServerSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPhase {
    Idle,
    Collecting,
    Finalizing,
    Committing,
    /// The last submit stopped because some files could not be finalized.
    PartialFailure,
}

/// One record written by a submit.
#[derive(Debug, Clone)]
pub struct PayloadSection {
    pub target: PersistTarget,
    /// Non-file form values
    pub base: Map<String, Value>,
    /// Keys of the fields merged into this record; `None` means all of them.
    pub fields: Option<Vec<String>>,
}

/// Records a submit writes, in order.
#[derive(Debug, Clone, Default)]
pub struct SubmitPlan {
    sections: Vec<PayloadSection>,
}

impl SubmitPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plan saving one record that carries every field.
    pub fn record(target: PersistTarget, base: Value) -> Self {
        Self::new().push(PayloadSection {
            target,
            base: into_object(base),
            fields: None,
        })
    }

    /// Add a record carrying only `field_keys`.
    pub fn section(self, target: PersistTarget, base: Value, field_keys: &[&str]) -> Self {
        self.push(PayloadSection {
            target,
            base: into_object(base),
            fields: Some(field_keys.iter().map(|k| k.to_string()).collect()),
        })
    }

    pub fn push(mut self, section: PayloadSection) -> Self {
        self.sections.push(section);
        self
    }

    pub fn sections(&self) -> &[PayloadSection] {
        &self.sections
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            tracing::warn!(value = %other, "Ignoring non-object base payload");
            Map::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Server responses, one per section
    pub saved: Vec<Value>,
    /// Files made permanent by this submit
    pub finalized: usize,
}

/// A field value as seen by payload composition.
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    pub key: String,
    pub multiple: bool,
    pub files: Vec<UploadableFile>,
}

impl From<&FieldUploadController> for FieldSnapshot {
    fn from(field: &FieldUploadController) -> Self {
        Self {
            key: field.key().to_string(),
            multiple: field.config().multiple,
            files: field.value(),
        }
    }
}

/// Merge file fields into `base`.
///
/// Permanent files contribute their URL under the field key. A staged file
/// (only left over under `FinalizeStrategy::ServerSide`) goes out as
/// `{key}TempId` (`{key}TempIds` for multi-file fields) and, for single-file
/// fields, the URL key is omitted. An empty single-file field is sent as
/// `null`. A `LOCAL_PENDING` file can never be persisted.
pub fn build_payload(
    base: &Map<String, Value>,
    fields: &[FieldSnapshot],
) -> Result<Map<String, Value>, UploadError> {
    let mut payload = base.clone();

    for field in fields {
        if let Some(local) = field.files.iter().find(|f| f.local_url().is_some()) {
            return Err(UploadError::Unexpected(format!(
                "field '{}' still holds unsent file '{}'",
                field.key, local.name
            )));
        }

        let temp_key = format!("{}TempId", field.key);
        let temp_keys = format!("{}TempIds", field.key);
        payload.remove(&temp_key);
        payload.remove(&temp_keys);

        if field.multiple {
            let urls: Vec<Value> = field
                .files
                .iter()
                .filter(|f| f.staging_id().is_none())
                .map(|f| Value::String(f.url.clone()))
                .collect();
            let staged: Vec<Value> = field
                .files
                .iter()
                .filter_map(|f| f.staging_id())
                .map(|id| Value::String(id.to_string()))
                .collect();

            payload.insert(field.key.clone(), Value::Array(urls));
            if !staged.is_empty() {
                payload.insert(temp_keys, Value::Array(staged));
            }
        } else {
            match field.files.first() {
                None => {
                    payload.insert(field.key.clone(), Value::Null);
                }
                Some(file) => match file.staging_id() {
                    Some(staging_id) => {
                        payload.remove(&field.key);
                        payload.insert(temp_key, Value::String(staging_id.to_string()));
                    }
                    None => {
                        payload.insert(field.key.clone(), Value::String(file.url.clone()));
                    }
                },
            }
        }
    }

    Ok(payload)
}

#[derive(Debug, Clone)]
struct ResolvedEntry {
    upload: FinalizedUpload,
    staging_id: Option<String>,
}

/// A pending file that must reach permanent storage before persisting.
#[derive(Debug)]
struct FinalizeJob {
    field_key: String,
    label: String,
    folder: String,
    resolve_key: String,
    file: UploadableFile,
}

impl FinalizeJob {
    fn failure(&self, message: String) -> FailedField {
        FailedField {
            key: self.field_key.clone(),
            label: self.label.clone(),
            file_name: self.file.name.clone(),
            message,
        }
    }
}

type JobResult<'a> = (&'a FinalizeJob, Result<FinalizedUpload, String>);

/// Clears the submitting flag however the submit ends.
struct SubmitGuard<'a>(&'a MountScope);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.end_submit();
    }
}

/// The upload fields of one mounted admin form.
pub struct UploadForm {
    client: Arc<dyn StagingClient>,
    tracker: Arc<ObjectUrlTracker>,
    scope: MountScope,
    strategy: FinalizeStrategy,
    fields: Mutex<Vec<FieldUploadController>>,
    resolved: Mutex<HashMap<String, ResolvedEntry>>,
    consumed: Mutex<Vec<String>>,
    phase: Mutex<SubmitPhase>,
}

impl UploadForm {
    pub fn new(client: Arc<dyn StagingClient>, previews: Arc<dyn PreviewBackend>) -> Self {
        Self {
            client,
            tracker: Arc::new(ObjectUrlTracker::new(previews)),
            scope: MountScope::new(),
            strategy: FinalizeStrategy::default(),
            fields: Mutex::new(Vec::new()),
            resolved: Mutex::new(HashMap::new()),
            consumed: Mutex::new(Vec::new()),
            phase: Mutex::new(SubmitPhase::Idle),
        }
    }

    /// Form with previews held in memory.
    pub fn in_memory(client: Arc<dyn StagingClient>) -> Self {
        Self::new(client, Arc::new(crate::tracker::InMemoryPreviews::new()))
    }

    pub fn with_strategy(mut self, strategy: FinalizeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> FinalizeStrategy {
        self.strategy
    }

    /// Register a field. Keys are unique within a form.
    pub fn add_field(&self, config: FieldConfig) -> Result<FieldUploadController, UploadError> {
        let mut fields = lock(&self.fields);
        if fields.iter().any(|f| f.key() == config.key) {
            return Err(UploadError::Unexpected(format!(
                "duplicate upload field '{}'",
                config.key
            )));
        }

        let field = FieldUploadController::new(
            config,
            self.client.clone(),
            self.tracker.clone(),
            self.scope.clone(),
        );
        fields.push(field.clone());
        Ok(field)
    }

    pub fn field(&self, key: &str) -> Option<FieldUploadController> {
        lock(&self.fields).iter().find(|f| f.key() == key).cloned()
    }

    pub fn fields(&self) -> Vec<FieldUploadController> {
        lock(&self.fields).clone()
    }

    pub fn tracker(&self) -> &Arc<ObjectUrlTracker> {
        &self.tracker
    }

    pub fn is_mounted(&self) -> bool {
        self.scope.is_mounted()
    }

    pub fn is_submitting(&self) -> bool {
        self.scope.is_submitting()
    }

    pub fn phase(&self) -> SubmitPhase {
        *lock(&self.phase)
    }

    /// Local preview references displayed by any field.
    pub fn active_local_urls(&self) -> HashSet<String> {
        self.fields()
            .iter()
            .flat_map(|f| f.local_urls())
            .collect()
    }

    /// Field values keyed by field, for draft autosave.
    pub fn values_json(&self) -> Value {
        let mut values = Map::new();
        for field in self.fields() {
            let value = if field.config().multiple {
                serde_json::to_value(field.value()).unwrap_or_default()
            } else {
                field
                    .first()
                    .and_then(|f| serde_json::to_value(f).ok())
                    .unwrap_or_default()
            };
            values.insert(field.key().to_string(), value);
        }
        Value::Object(values)
    }

    /// Finalize every pending file, then persist the plan's records.
    ///
    /// Fails fast with `SubmitInProgress` while another submit runs and with
    /// `UploadsPending` while a field is still uploading.
    #[tracing::instrument(skip_all, fields(sections = plan.sections.len(), strategy = ?self.strategy))]
    pub async fn submit(
        &self,
        plan: &SubmitPlan,
        persistence: &dyn RecordPersistence,
    ) -> Result<SubmitOutcome, UploadError> {
        if !self.scope.begin_submit() {
            tracing::debug!("Submit ignored; another submission is running");
            return Err(UploadError::SubmitInProgress);
        }
        let _guard = SubmitGuard(&self.scope);

        if !self.scope.is_mounted() {
            return Err(UploadError::Unexpected("form is no longer mounted".to_string()));
        }

        let fields = self.fields();
        self.check_plan(plan, &fields)?;

        let busy: Vec<String> = fields
            .iter()
            .filter(|f| f.is_uploading())
            .map(|f| f.config().label.clone())
            .collect();
        if !busy.is_empty() {
            return Err(UploadError::UploadsPending { fields: busy });
        }

        self.set_phase(SubmitPhase::Collecting);
        let jobs = self.collect_jobs(&fields);
        tracing::debug!(jobs = jobs.len(), "Collected pending uploads");

        self.set_phase(SubmitPhase::Finalizing);
        let failed = self.finalize_jobs(&jobs).await;
        if !failed.is_empty() {
            self.set_phase(SubmitPhase::PartialFailure);
            let labels: Vec<&str> = failed.iter().map(|f| f.label.as_str()).collect();
            tracing::warn!(
                failed = failed.len(),
                fields = ?labels,
                "Finalize failed; record not saved"
            );
            return Err(UploadError::Finalize { failed });
        }

        self.set_phase(SubmitPhase::Committing);
        let mut finalized = self.apply_resolved(&fields);

        let mut saved = Vec::with_capacity(plan.sections.len());
        for section in &plan.sections {
            let section_fields: Vec<&FieldUploadController> = fields
                .iter()
                .filter(|f| match &section.fields {
                    Some(keys) => keys.iter().any(|k| k == f.key()),
                    None => true,
                })
                .collect();
            let snapshots: Vec<FieldSnapshot> =
                section_fields.iter().map(|f| FieldSnapshot::from(*f)).collect();

            let payload = match build_payload(&section.base, &snapshots) {
                Ok(payload) => payload,
                Err(e) => {
                    self.set_phase(SubmitPhase::Idle);
                    return Err(e);
                }
            };

            match persistence
                .persist(&section.target, &Value::Object(payload))
                .await
            {
                Ok(record) => {
                    if self.strategy == FinalizeStrategy::ServerSide {
                        finalized += section_fields
                            .iter()
                            .map(|f| f.settle_from_record(&record))
                            .sum::<usize>();
                    }
                    saved.push(record);
                }
                Err(source) => {
                    self.set_phase(SubmitPhase::Idle);
                    tracing::error!(
                        error = %source,
                        target = %section.target,
                        "Failed to persist record"
                    );
                    return Err(UploadError::Persistence {
                        target: section.target.to_string(),
                        source,
                    });
                }
            }
        }

        self.discard_consumed().await;
        self.set_phase(SubmitPhase::Idle);
        tracing::info!(records = saved.len(), finalized, "Form submitted");

        Ok(SubmitOutcome { saved, finalized })
    }

    fn check_plan(
        &self,
        plan: &SubmitPlan,
        fields: &[FieldUploadController],
    ) -> Result<(), UploadError> {
        for section in &plan.sections {
            for key in section.fields.iter().flatten() {
                if !fields.iter().any(|f| f.key() == key) {
                    return Err(UploadError::Unexpected(format!(
                        "{} refers to unknown upload field '{}'",
                        section.target, key
                    )));
                }
            }
        }
        Ok(())
    }

    fn collect_jobs(&self, fields: &[FieldUploadController]) -> Vec<FinalizeJob> {
        let resolved = lock(&self.resolved);
        let mut jobs = Vec::new();
        let mut seen = HashSet::new();

        for field in fields {
            let config = field.config();
            for file in field.pending_files() {
                let Some(resolve_key) = pending_key(&file) else {
                    continue;
                };
                if resolved.contains_key(&resolve_key) {
                    continue;
                }
                if file.staging_id().is_some() && self.strategy == FinalizeStrategy::ServerSide {
                    continue;
                }
                if !seen.insert(resolve_key.clone()) {
                    continue;
                }
                jobs.push(FinalizeJob {
                    field_key: config.key.clone(),
                    label: config.label.clone(),
                    folder: config.folder.clone(),
                    resolve_key,
                    file,
                });
            }
        }
        jobs
    }

    /// Run every job concurrently, caching successes. Returns the failures.
    async fn finalize_jobs(&self, jobs: &[FinalizeJob]) -> Vec<FailedField> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let (staged, local): (Vec<&FinalizeJob>, Vec<&FinalizeJob>) =
            jobs.iter().partition(|job| job.file.staging_id().is_some());

        let direct = join_all(local.into_iter().map(|job| async move {
            let result = match job.file.raw() {
                Some(raw) => self
                    .client
                    .upload_direct(raw, &job.folder)
                    .await
                    .map_err(|e| e.user_message()),
                None => Err("Data file tidak tersedia".to_string()),
            };
            (job, result)
        }));

        let (staged_results, direct_results) = futures::join!(self.finalize_staged(staged), direct);

        let mut failed = Vec::new();
        let mut resolved = lock(&self.resolved);
        for (job, result) in staged_results.into_iter().chain(direct_results) {
            match result {
                Ok(upload) => {
                    resolved.insert(
                        job.resolve_key.clone(),
                        ResolvedEntry {
                            upload,
                            staging_id: job.file.staging_id().map(str::to_string),
                        },
                    );
                }
                Err(message) => {
                    tracing::warn!(
                        field = %job.field_key,
                        file.name = %job.file.name,
                        error = %message,
                        "Failed to finalize upload"
                    );
                    failed.push(job.failure(message));
                }
            }
        }
        failed
    }

    /// One staged file goes through the single finalize endpoint; several go
    /// through one bulk call.
    async fn finalize_staged<'a>(&self, jobs: Vec<&'a FinalizeJob>) -> Vec<JobResult<'a>> {
        match jobs.len() {
            0 => Vec::new(),
            1 => {
                let job = jobs[0];
                let staging_id = job.file.staging_id().unwrap_or_default();
                let result = match self.client.finalize_upload(staging_id, &job.folder).await {
                    Ok(upload) => Ok(upload),
                    Err(ClientError::AlreadyFinalized { url }) => {
                        tracing::info!(staging_id = %staging_id, url = %url, "Staged upload was already finalized");
                        Ok(FinalizedUpload::from_url(url))
                    }
                    Err(e) => Err(e.user_message()),
                };
                vec![(job, result)]
            }
            _ => {
                let items: Vec<FinalizeItem> = jobs
                    .iter()
                    .map(|job| FinalizeItem {
                        staging_id: job.file.staging_id().unwrap_or_default().to_string(),
                        folder: job.folder.clone(),
                    })
                    .collect();

                match self.client.finalize_bulk(&items).await {
                    Ok(outcome) => jobs
                        .into_iter()
                        .map(|job| {
                            let staging_id = job.file.staging_id().unwrap_or_default();
                            let result = if let Some(item) =
                                outcome.succeeded.iter().find(|i| i.staging_id == staging_id)
                            {
                                Ok(item.upload.clone())
                            } else if let Some(item) =
                                outcome.failed.iter().find(|i| i.staging_id == staging_id)
                            {
                                Err(item.error_message.clone())
                            } else {
                                Err("Tidak ada respons untuk file ini".to_string())
                            };
                            (job, result)
                        })
                        .collect(),
                    Err(e) => {
                        let message = e.user_message();
                        jobs.into_iter().map(|job| (job, Err(message.clone()))).collect()
                    }
                }
            }
        }
    }

    /// Move cached results into the field values. Staging ids they consumed
    /// are remembered for cleanup after a successful save.
    fn apply_resolved(&self, fields: &[FieldUploadController]) -> usize {
        let entries: HashMap<String, ResolvedEntry> = lock(&self.resolved).drain().collect();
        if entries.is_empty() {
            return 0;
        }

        lock(&self.consumed).extend(entries.values().filter_map(|e| e.staging_id.clone()));
        let uploads: HashMap<String, FinalizedUpload> = entries
            .into_iter()
            .map(|(key, entry)| (key, entry.upload))
            .collect();

        fields.iter().map(|f| f.apply_resolved(&uploads)).sum()
    }

    async fn discard_consumed(&self) {
        let consumed: Vec<String> = std::mem::take(&mut *lock(&self.consumed));
        if consumed.is_empty() {
            return;
        }
        join_all(
            consumed
                .iter()
                .map(|staging_id| discard_staged(self.client.as_ref(), staging_id)),
        )
        .await;
    }

    fn set_phase(&self, phase: SubmitPhase) {
        *lock(&self.phase) = phase;
    }

    /// Tear the form down: late upload completions are dropped and every
    /// preview reference still alive is released. Idempotent.
    pub fn unmount(&self) {
        if self.scope.unmount() {
            let released = self.tracker.release_all();
            tracing::debug!(released, "Upload form torn down");
        }
    }
}

impl Drop for UploadForm {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for UploadForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadForm")
            .field("strategy", &self.strategy)
            .field("fields", &self.fields())
            .field("phase", &self.phase())
            .field("mounted", &self.scope.is_mounted())
            .finish()
    }
}

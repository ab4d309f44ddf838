#![allow(dead_code)]

use async_trait::async_trait;
use genbi_core::models::{
    BulkFinalizeOutcome, FinalizeFailure, FinalizeItem, FinalizedItem, FinalizedUpload, RawFile,
    StagedUpload,
};
use genbi_core::{ClientError, ClientResult, PersistTarget, RecordPersistence, StagingClient};
use genbi_uploads::{InMemoryPreviews, PreviewBackend};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Stage(String),
    Finalize(String),
    FinalizeBulk(Vec<String>),
    Delete(String),
    Direct(String),
}

/// In-memory staging service. Staging ids are `tmp-{file name}`; permanent
/// URLs are `https://cdn.genbi.test/{folder}/{file name or id}`.
#[derive(Default)]
pub struct MockStaging {
    calls: Mutex<Vec<Call>>,
    stage_gates: Mutex<HashMap<String, Arc<Notify>>>,
    finalize_gate: Mutex<Option<Arc<Notify>>>,
    fail_staging: Mutex<HashSet<String>>,
    fail_finalize: Mutex<HashMap<String, String>>,
    already_finalized: Mutex<HashSet<String>>,
    fail_direct: Mutex<HashSet<String>>,
}

impl MockStaging {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn finalize_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Finalize(_) | Call::FinalizeBulk(_)))
            .collect()
    }

    /// Hold the staging upload of `file_name` until the returned gate is notified.
    pub fn hold_staging(&self, file_name: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.stage_gates
            .lock()
            .unwrap()
            .insert(file_name.to_string(), gate.clone());
        gate
    }

    pub fn hold_finalize(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.finalize_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fail_staging(&self, file_name: &str) {
        self.fail_staging.lock().unwrap().insert(file_name.to_string());
    }

    pub fn fail_finalize(&self, staging_id: &str, message: &str) {
        self.fail_finalize
            .lock()
            .unwrap()
            .insert(staging_id.to_string(), message.to_string());
    }

    pub fn heal_finalize(&self, staging_id: &str) {
        self.fail_finalize.lock().unwrap().remove(staging_id);
    }

    pub fn mark_already_finalized(&self, staging_id: &str) {
        self.already_finalized
            .lock()
            .unwrap()
            .insert(staging_id.to_string());
    }

    pub fn fail_direct(&self, file_name: &str) {
        self.fail_direct.lock().unwrap().insert(file_name.to_string());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn wait_finalize_gate(&self) {
        let gate = self.finalize_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn finalize_one(&self, staging_id: &str, folder: &str) -> Result<FinalizedUpload, String> {
        if let Some(message) = self.fail_finalize.lock().unwrap().get(staging_id) {
            return Err(message.clone());
        }
        Ok(FinalizedUpload::from_url(permanent_url(folder, staging_id)))
    }
}

pub fn permanent_url(folder: &str, name: &str) -> String {
    format!("https://cdn.genbi.test/{folder}/{name}")
}

pub fn staging_id(file_name: &str) -> String {
    format!("tmp-{file_name}")
}

#[async_trait]
impl StagingClient for MockStaging {
    async fn upload_to_staging(&self, file: &RawFile) -> ClientResult<StagedUpload> {
        self.record(Call::Stage(file.name.clone()));
        let gate = self.stage_gates.lock().unwrap().get(&file.name).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_staging.lock().unwrap().contains(&file.name) {
            return Err(ClientError::Server {
                status: 413,
                message: "File terlalu besar".to_string(),
            });
        }
        Ok(StagedUpload {
            staging_id: staging_id(&file.name),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.size_bytes(),
            preview_url: format!("https://api.genbi.test/temp/{}", staging_id(&file.name)),
            expires_at: None,
        })
    }

    async fn finalize_upload(&self, staging_id: &str, folder: &str) -> ClientResult<FinalizedUpload> {
        self.record(Call::Finalize(staging_id.to_string()));
        self.wait_finalize_gate().await;
        if self.already_finalized.lock().unwrap().contains(staging_id) {
            return Err(ClientError::AlreadyFinalized {
                url: permanent_url(folder, staging_id),
            });
        }
        self.finalize_one(staging_id, folder)
            .map_err(|message| ClientError::Server {
                status: 410,
                message,
            })
    }

    async fn finalize_bulk(&self, items: &[FinalizeItem]) -> ClientResult<BulkFinalizeOutcome> {
        self.record(Call::FinalizeBulk(
            items.iter().map(|i| i.staging_id.clone()).collect(),
        ));
        self.wait_finalize_gate().await;
        let mut outcome = BulkFinalizeOutcome::default();
        for item in items {
            match self.finalize_one(&item.staging_id, &item.folder) {
                Ok(upload) => outcome.succeeded.push(FinalizedItem {
                    staging_id: item.staging_id.clone(),
                    upload,
                }),
                Err(error_message) => outcome.failed.push(FinalizeFailure {
                    staging_id: item.staging_id.clone(),
                    error_message,
                }),
            }
        }
        Ok(outcome)
    }

    async fn delete_staged(&self, staging_id: &str) -> ClientResult<()> {
        self.record(Call::Delete(staging_id.to_string()));
        Ok(())
    }

    async fn upload_direct(&self, file: &RawFile, folder: &str) -> ClientResult<FinalizedUpload> {
        self.record(Call::Direct(file.name.clone()));
        if self.fail_direct.lock().unwrap().contains(&file.name) {
            return Err(ClientError::Network("connection reset".to_string()));
        }
        Ok(FinalizedUpload::from_url(permanent_url(folder, &file.name)))
    }
}

/// Records every persisted payload; fails the next `n` calls on demand.
///
/// The returned record echoes the payload. With `finalize_temp_ids`, it
/// behaves like an endpoint that finalizes `{key}TempId(s)` itself and
/// returns the permanent URLs under `{key}`.
#[derive(Default)]
pub struct MockPersistence {
    saved: Mutex<Vec<(String, Value)>>,
    failures: Mutex<usize>,
    temp_id_folder: Mutex<Option<String>>,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalize_temp_ids(&self, folder: &str) {
        *self.temp_id_folder.lock().unwrap() = Some(folder.to_string());
    }

    fn record_for(&self, payload: &Value) -> Value {
        let Some(folder) = self.temp_id_folder.lock().unwrap().clone() else {
            return payload.clone();
        };
        let mut record = payload.as_object().cloned().unwrap_or_default();
        let keys: Vec<String> = record.keys().cloned().collect();
        for key in keys {
            if let Some(field) = key.strip_suffix("TempIds") {
                let ids = record.remove(&key).unwrap_or_default();
                let mut urls = record
                    .get(field)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for id in ids.as_array().into_iter().flatten().filter_map(Value::as_str) {
                    urls.push(Value::String(permanent_url(&folder, id)));
                }
                record.insert(field.to_string(), Value::Array(urls));
            } else if let Some(field) = key.strip_suffix("TempId") {
                if let Some(Value::String(id)) = record.remove(&key) {
                    record.insert(field.to_string(), Value::String(permanent_url(&folder, &id)));
                }
            }
        }
        Value::Object(record)
    }

    pub fn fail_next(&self, n: usize) {
        *self.failures.lock().unwrap() = n;
    }

    pub fn saved(&self) -> Vec<(String, Value)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordPersistence for MockPersistence {
    async fn persist(&self, target: &PersistTarget, payload: &Value) -> ClientResult<Value> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ClientError::Server {
                    status: 500,
                    message: "database unavailable".to_string(),
                });
            }
        }
        self.saved
            .lock()
            .unwrap()
            .push((target.to_string(), payload.clone()));
        Ok(self.record_for(payload))
    }
}

/// Preview backend that counts revocations per reference.
#[derive(Default)]
pub struct CountingPreviews {
    inner: InMemoryPreviews,
    revoked: Mutex<HashMap<String, usize>>,
}

impl CountingPreviews {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live_count(&self) -> usize {
        self.inner.live_count()
    }

    pub fn revocations(&self, url: &str) -> usize {
        self.revoked.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn max_revocations(&self) -> usize {
        self.revoked.lock().unwrap().values().copied().max().unwrap_or(0)
    }
}

impl PreviewBackend for CountingPreviews {
    fn create_object_url(&self, file: &RawFile) -> String {
        self.inner.create_object_url(file)
    }

    fn revoke_object_url(&self, url: &str) {
        *self.revoked.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.inner.revoke_object_url(url);
    }
}

pub fn png(name: &str) -> RawFile {
    RawFile::new(name, "image/png", vec![0x89u8, 0x50, 0x4E, 0x47])
}

pub fn pdf(name: &str) -> RawFile {
    RawFile::new(name, "application/pdf", b"%PDF-1.4".to_vec())
}

/// Let spawned tasks run until `condition` holds.
pub async fn until(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

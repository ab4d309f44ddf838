//! Collaborator traits for the upload lifecycle
//!
//! `StagingClient` covers temporary storage and its promotion to permanent
//! storage; `RecordPersistence` saves the composed form payload. The HTTP
//! implementation lives in `genbi-api-client`; tests use in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::ClientError;
use crate::models::{BulkFinalizeOutcome, FinalizeItem, FinalizedUpload, RawFile, StagedUpload};

pub type ClientResult<T> = Result<T, ClientError>;

#[async_trait]
pub trait StagingClient: Send + Sync {
    /// Upload raw bytes to temporary storage.
    async fn upload_to_staging(&self, file: &RawFile) -> ClientResult<StagedUpload>;

    /// Promote one staged file to permanent storage. Consumes the staging id.
    async fn finalize_upload(&self, staging_id: &str, folder: &str) -> ClientResult<FinalizedUpload>;

    /// Promote several staged files. Per-item failures are aggregated in the
    /// outcome; only a failure of the whole request is an `Err`.
    async fn finalize_bulk(&self, items: &[FinalizeItem]) -> ClientResult<BulkFinalizeOutcome>;

    /// Drop a staged artifact. Callers treat failures as non-fatal.
    async fn delete_staged(&self, staging_id: &str) -> ClientResult<()>;

    /// Upload raw bytes straight to permanent storage.
    async fn upload_direct(&self, file: &RawFile, folder: &str) -> ClientResult<FinalizedUpload>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMethod {
    Post,
    Put,
    Patch,
}

impl fmt::Display for PersistMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistMethod::Post => write!(f, "POST"),
            PersistMethod::Put => write!(f, "PUT"),
            PersistMethod::Patch => write!(f, "PATCH"),
        }
    }
}

/// Where a composed payload is saved, e.g. `PATCH /cms/settings/hero`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistTarget {
    pub method: PersistMethod,
    pub path: String,
}

impl PersistTarget {
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: PersistMethod::Post,
            path: path.into(),
        }
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self {
            method: PersistMethod::Put,
            path: path.into(),
        }
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self {
            method: PersistMethod::Patch,
            path: path.into(),
        }
    }
}

impl fmt::Display for PersistTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[async_trait]
pub trait RecordPersistence: Send + Sync {
    /// Save the payload and return the saved record.
    async fn persist(&self, target: &PersistTarget, payload: &Value) -> ClientResult<Value>;
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file held in temporary storage, normalized from the staging response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedUpload {
    /// Identifier in temporary storage (the server's `tempId`)
    pub staging_id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Server-hosted preview of the staged bytes
    pub preview_url: String,
    /// When temporary storage drops the artifact if never finalized
    pub expires_at: Option<DateTime<Utc>>,
}

/// A file in permanent storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedUpload {
    pub url: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
}

impl FinalizedUpload {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            mime_type: None,
            size_bytes: None,
        }
    }
}

/// One entry of a bulk finalize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeItem {
    pub staging_id: String,
    /// Destination folder in permanent storage (e.g. `activities`)
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedItem {
    pub staging_id: String,
    pub upload: FinalizedUpload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeFailure {
    pub staging_id: String,
    pub error_message: String,
}

/// Aggregated result of a bulk finalize; individual failures never error the call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFinalizeOutcome {
    pub succeeded: Vec<FinalizedItem>,
    pub failed: Vec<FinalizeFailure>,
}

impl BulkFinalizeOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

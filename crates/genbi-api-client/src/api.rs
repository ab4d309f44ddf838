//! Upload lifecycle and persistence endpoints.
//!
//! Wire types mirror the backend's camelCase JSON and are normalized into the
//! `genbi_core::models` shapes before leaving this module.

use crate::{decode, ApiClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genbi_core::models::{
    BulkFinalizeOutcome, FinalizeFailure, FinalizeItem, FinalizedItem, FinalizedUpload, RawFile,
    StagedUpload,
};
use genbi_core::{
    ClientError, ClientResult, PersistMethod, PersistTarget, RecordPersistence, StagingClient,
};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response of `POST /uploads/temp`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TempUploadResponse {
    temp_id: Option<String>,
    name: Option<String>,
    mime_type: Option<String>,
    size: Option<u64>,
    preview_url: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Response of `POST /uploads/finalize` and `POST /uploads`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredFileResponse {
    url: Option<String>,
    name: Option<String>,
    mime_type: Option<String>,
    size: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeRequest<'a> {
    temp_id: &'a str,
    folder: &'a str,
}

#[derive(Debug, Serialize)]
struct FinalizeBulkRequest<'a> {
    files: Vec<FinalizeRequest<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkUploadedEntry {
    temp_id: String,
    url: Option<String>,
    name: Option<String>,
    mime_type: Option<String>,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkErrorEntry {
    temp_id: String,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FinalizeBulkResponse {
    #[serde(default)]
    uploaded: Vec<BulkUploadedEntry>,
    #[serde(default)]
    errors: Vec<BulkErrorEntry>,
}

impl StoredFileResponse {
    fn into_finalized(self) -> ClientResult<FinalizedUpload> {
        let url = self
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::MalformedResponse("response is missing url".to_string()))?;
        Ok(FinalizedUpload {
            url,
            name: self.name,
            mime_type: self.mime_type,
            size_bytes: self.size,
        })
    }
}

fn file_part(file: &RawFile) -> Part {
    let part = Part::bytes(file.data.to_vec()).file_name(file.name.clone());
    match part.mime_str(&file.mime_type) {
        Ok(part) => part,
        Err(e) => {
            tracing::debug!(error = %e, mime_type = %file.mime_type, "Sending file without content type");
            Part::bytes(file.data.to_vec()).file_name(file.name.clone())
        }
    }
}

impl ApiClient {
    /// Upload a file to temporary storage.
    #[tracing::instrument(skip(self, file), fields(file.name = %file.name, file.size = file.size_bytes()))]
    pub async fn stage_file(&self, file: &RawFile) -> ClientResult<StagedUpload> {
        let form = Form::new().part("file", file_part(file));
        let request = self.client().post(self.api_url("uploads/temp")).multipart(form);
        let response: TempUploadResponse = decode(self.execute(request).await?)?;

        let staging_id = response
            .temp_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::MalformedResponse("response is missing tempId".to_string()))?;
        let preview_url = response.preview_url.ok_or_else(|| {
            ClientError::MalformedResponse("response is missing previewUrl".to_string())
        })?;

        tracing::debug!(staging_id = %staging_id, "File staged");

        Ok(StagedUpload {
            staging_id,
            name: response.name.unwrap_or_else(|| file.name.clone()),
            mime_type: response.mime_type.unwrap_or_else(|| file.mime_type.clone()),
            size_bytes: response.size.unwrap_or_else(|| file.size_bytes()),
            preview_url,
            expires_at: response.expires_at,
        })
    }

    /// Move one staged file to permanent storage.
    #[tracing::instrument(skip(self))]
    pub async fn finalize_staged(&self, staging_id: &str, folder: &str) -> ClientResult<FinalizedUpload> {
        let body = FinalizeRequest {
            temp_id: staging_id,
            folder,
        };
        let request = self.client().post(self.api_url("uploads/finalize")).json(&body);
        let response: StoredFileResponse = decode(self.execute(request).await?)?;
        response.into_finalized()
    }

    /// Move several staged files to permanent storage in one request.
    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    pub async fn finalize_staged_bulk(&self, items: &[FinalizeItem]) -> ClientResult<BulkFinalizeOutcome> {
        let body = FinalizeBulkRequest {
            files: items
                .iter()
                .map(|item| FinalizeRequest {
                    temp_id: &item.staging_id,
                    folder: &item.folder,
                })
                .collect(),
        };
        let request = self
            .client()
            .post(self.api_url("uploads/finalize-bulk"))
            .json(&body);
        let response: FinalizeBulkResponse = decode(self.execute(request).await?)?;

        let mut outcome = BulkFinalizeOutcome::default();
        for entry in response.uploaded {
            match entry.url.filter(|u| !u.is_empty()) {
                Some(url) => outcome.succeeded.push(FinalizedItem {
                    staging_id: entry.temp_id,
                    upload: FinalizedUpload {
                        url,
                        name: entry.name,
                        mime_type: entry.mime_type,
                        size_bytes: entry.size,
                    },
                }),
                None => outcome.failed.push(FinalizeFailure {
                    staging_id: entry.temp_id,
                    error_message: "response is missing url".to_string(),
                }),
            }
        }
        for entry in response.errors {
            outcome.failed.push(FinalizeFailure {
                staging_id: entry.temp_id,
                error_message: entry.error.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        // Items the server silently skipped count as failures
        for item in items {
            let reported = outcome.succeeded.iter().any(|s| s.staging_id == item.staging_id)
                || outcome.failed.iter().any(|f| f.staging_id == item.staging_id);
            if !reported {
                outcome.failed.push(FinalizeFailure {
                    staging_id: item.staging_id.clone(),
                    error_message: "not reported by server".to_string(),
                });
            }
        }

        tracing::debug!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Bulk finalize completed"
        );

        Ok(outcome)
    }

    /// Delete a staged file from temporary storage.
    #[tracing::instrument(skip(self))]
    pub async fn discard_staged(&self, staging_id: &str) -> ClientResult<()> {
        let path = format!("uploads/temp/{}", urlencoding::encode(staging_id));
        self.execute(self.client().delete(self.api_url(&path)))
            .await
            .map(|_| ())
    }

    /// Upload a file straight to permanent storage.
    #[tracing::instrument(skip(self, file), fields(file.name = %file.name, file.size = file.size_bytes()))]
    pub async fn upload_file(&self, file: &RawFile, folder: &str) -> ClientResult<FinalizedUpload> {
        let form = Form::new()
            .part("file", file_part(file))
            .text("folder", folder.to_string());
        let request = self.client().post(self.api_url("uploads")).multipart(form);
        let response: StoredFileResponse = decode(self.execute(request).await?)?;
        response.into_finalized()
    }

    /// Save a composed record payload under the API prefix.
    #[tracing::instrument(skip(self, payload), fields(target = %target))]
    pub async fn save_record(&self, target: &PersistTarget, payload: &Value) -> ClientResult<Value> {
        let url = self.api_url(&target.path);
        let request = match target.method {
            PersistMethod::Post => self.client().post(&url),
            PersistMethod::Put => self.client().put(&url),
            PersistMethod::Patch => self.client().patch(&url),
        };
        self.execute(request.json(payload)).await
    }
}

#[async_trait]
impl StagingClient for ApiClient {
    async fn upload_to_staging(&self, file: &RawFile) -> ClientResult<StagedUpload> {
        self.stage_file(file).await
    }

    async fn finalize_upload(&self, staging_id: &str, folder: &str) -> ClientResult<FinalizedUpload> {
        self.finalize_staged(staging_id, folder).await
    }

    async fn finalize_bulk(&self, items: &[FinalizeItem]) -> ClientResult<BulkFinalizeOutcome> {
        self.finalize_staged_bulk(items).await
    }

    async fn delete_staged(&self, staging_id: &str) -> ClientResult<()> {
        self.discard_staged(staging_id).await
    }

    async fn upload_direct(&self, file: &RawFile, folder: &str) -> ClientResult<FinalizedUpload> {
        self.upload_file(file, folder).await
    }
}

#[async_trait]
impl RecordPersistence for ApiClient {
    async fn persist(&self, target: &PersistTarget, payload: &Value) -> ClientResult<Value> {
        self.save_record(target, payload).await
    }
}

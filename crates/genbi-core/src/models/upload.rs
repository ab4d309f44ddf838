use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::staging::{FinalizedUpload, StagedUpload};

/// Raw bytes of a file picked by the user.
///
/// Only lives inside a `LOCAL_PENDING` value; never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if path
            .components()
            .any(|c| c == std::path::Component::ParentDir)
        {
            return Err(anyhow::anyhow!("Invalid input: {}", path.display()));
        }
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file.bin")
            .to_string();
        let mime_type = guess_mime_type(&name).to_string();

        Ok(Self::new(name, mime_type, data))
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for RawFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Best-effort MIME type from a file extension.
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "zip" => "application/zip",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Flat view of where a file value currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OriginKind {
    LocalPending,
    Staged,
    Finalized,
    RemoteExisting,
}

/// Lifecycle state of a file value, carrying only the data valid for that state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "originKind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileOrigin {
    /// Picked but not sent anywhere; `url` is a local preview reference.
    LocalPending {
        #[serde(skip)]
        raw: RawFile,
    },
    /// In temporary storage; `url` is the server preview.
    Staged {
        #[serde(rename = "stagingId")]
        staging_id: String,
        #[serde(rename = "expiresAt")]
        expires_at: Option<DateTime<Utc>>,
    },
    /// In permanent storage.
    Finalized,
    /// Loaded from a previously saved record.
    RemoteExisting,
}

/// A file attached to a form field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadableFile {
    pub name: String,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(flatten)]
    pub origin: FileOrigin,
}

impl UploadableFile {
    /// A freshly picked file previewed through a local reference.
    pub fn local(raw: RawFile, local_url: String) -> Self {
        Self {
            name: raw.name.clone(),
            url: local_url,
            mime_type: raw.mime_type.clone(),
            size_bytes: raw.size_bytes(),
            origin: FileOrigin::LocalPending { raw },
        }
    }

    pub fn staged(upload: StagedUpload) -> Self {
        Self {
            name: upload.name,
            url: upload.preview_url,
            mime_type: upload.mime_type,
            size_bytes: upload.size_bytes,
            origin: FileOrigin::Staged {
                staging_id: upload.staging_id,
                expires_at: upload.expires_at,
            },
        }
    }

    /// A permanent copy. Name/type/size fall back to `previous` when the
    /// server response omits them.
    pub fn finalized(upload: FinalizedUpload, previous: Option<&UploadableFile>) -> Self {
        let fallback = previous.map(|p| (p.name.as_str(), p.mime_type.as_str(), p.size_bytes));
        Self::finalized_with(upload, fallback)
    }

    /// A permanent copy of a file uploaded directly from its raw bytes.
    pub fn finalized_from_raw(upload: FinalizedUpload, raw: &RawFile) -> Self {
        let fallback = (raw.name.as_str(), raw.mime_type.as_str(), raw.size_bytes());
        Self::finalized_with(upload, Some(fallback))
    }

    fn finalized_with(upload: FinalizedUpload, fallback: Option<(&str, &str, u64)>) -> Self {
        let name = upload
            .name
            .or_else(|| fallback.map(|(name, _, _)| name.to_string()))
            .unwrap_or_else(|| file_name_from_url(&upload.url));
        Self {
            name,
            mime_type: upload
                .mime_type
                .or_else(|| fallback.map(|(_, mime, _)| mime.to_string()))
                .unwrap_or_default(),
            size_bytes: upload
                .size_bytes
                .or_else(|| fallback.map(|(_, _, size)| size))
                .unwrap_or_default(),
            url: upload.url,
            origin: FileOrigin::Finalized,
        }
    }

    /// A file already referenced by a saved record.
    pub fn remote(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: file_name_from_url(&url),
            url,
            mime_type: String::new(),
            size_bytes: 0,
            origin: FileOrigin::RemoteExisting,
        }
    }

    pub fn origin_kind(&self) -> OriginKind {
        match self.origin {
            FileOrigin::LocalPending { .. } => OriginKind::LocalPending,
            FileOrigin::Staged { .. } => OriginKind::Staged,
            FileOrigin::Finalized => OriginKind::Finalized,
            FileOrigin::RemoteExisting => OriginKind::RemoteExisting,
        }
    }

    pub fn staging_id(&self) -> Option<&str> {
        match &self.origin {
            FileOrigin::Staged { staging_id, .. } => Some(staging_id),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match &self.origin {
            FileOrigin::Staged { expires_at, .. } => *expires_at,
            _ => None,
        }
    }

    /// The local preview reference, present only while `LOCAL_PENDING`.
    pub fn local_url(&self) -> Option<&str> {
        match self.origin {
            FileOrigin::LocalPending { .. } => Some(&self.url),
            _ => None,
        }
    }

    pub fn raw(&self) -> Option<&RawFile> {
        match &self.origin {
            FileOrigin::LocalPending { raw } => Some(raw),
            _ => None,
        }
    }

    /// Whether the value still needs work before it can be persisted.
    pub fn is_pending(&self) -> bool {
        matches!(
            self.origin,
            FileOrigin::LocalPending { .. } | FileOrigin::Staged { .. }
        )
    }
}

fn file_name_from_url(url: &str) -> String {
    url.split('?')
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .unwrap_or("file")
        .to_string()
}

//! Error types module
//!
//! Errors are split along the upload lifecycle: `ClientError` for anything the
//! remote collaborators report, `ValidationError` for the local gate that runs
//! before any network call, and `UploadError` for what a field or a form submit
//! surfaces to the user.
//!
//! Cleanup failures (revoking a preview, deleting a staged artifact) are never
//! represented here; they are logged and dropped at the call site.

use crate::validation::ValidationError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like a failed upload
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented to the admin user.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "FINALIZE_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same action can succeed
    fn is_recoverable(&self) -> bool;

    /// User-facing message, in the console's language
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Failure reported by a remote collaborator (staging, finalize, persistence).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The staging id was already consumed and the server told us where the
    /// permanent copy lives.
    #[error("Upload already finalized at {url}")]
    AlreadyFinalized { url: String },
}

impl ClientError {
    /// Short message suitable for a field-level error label.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Network(_) => "Gagal terhubung ke server".to_string(),
            ClientError::Server { status, message } if *status < 500 && !message.is_empty() => {
                message.clone()
            }
            ClientError::Server { .. } => "Terjadi kesalahan pada server".to_string(),
            ClientError::MalformedResponse(_) => "Respons server tidak valid".to_string(),
            ClientError::AlreadyFinalized { .. } => "File sudah tersimpan".to_string(),
        }
    }
}

/// A form field whose pending upload could not be made permanent.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedField {
    /// Payload key of the field
    pub key: String,
    /// User-facing field label
    pub label: String,
    /// Original file name
    pub file_name: String,
    /// Reason reported by the server
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Staging upload failed: {0}")]
    StagingUpload(#[source] ClientError),

    #[error("{} file(s) failed to finalize", failed.len())]
    Finalize { failed: Vec<FailedField> },

    #[error("Persisting {target} failed: {source}")]
    Persistence {
        target: String,
        #[source]
        source: ClientError,
    },

    #[error("A submission is already in progress")]
    SubmitInProgress,

    #[error("Uploads still in progress: {}", fields.join(", "))]
    UploadsPending { fields: Vec<String> },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<anyhow::Error> for UploadError {
    fn from(err: anyhow::Error) -> Self {
        UploadError::Unexpected(err.to_string())
    }
}

impl UploadError {
    /// Labels of the fields that could not be finalized, if any.
    pub fn failed_labels(&self) -> Vec<&str> {
        match self {
            UploadError::Finalize { failed } => failed.iter().map(|f| f.label.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

impl ErrorMetadata for UploadError {
    fn error_code(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "VALIDATION_ERROR",
            UploadError::StagingUpload(_) => "STAGING_UPLOAD_FAILED",
            UploadError::Finalize { .. } => "FINALIZE_FAILED",
            UploadError::Persistence { .. } => "PERSISTENCE_FAILED",
            UploadError::SubmitInProgress => "SUBMIT_IN_PROGRESS",
            UploadError::UploadsPending { .. } => "UPLOADS_PENDING",
            UploadError::Unexpected(_) => "UNEXPECTED_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, UploadError::Validation(_))
    }

    fn client_message(&self) -> String {
        match self {
            UploadError::Validation(err) => err.to_string(),
            UploadError::StagingUpload(err) => format!("Gagal mengupload file: {}", err.user_message()),
            UploadError::Finalize { failed } => {
                let labels: Vec<&str> = failed.iter().map(|f| f.label.as_str()).collect();
                format!("{} file gagal diupload: {}", failed.len(), labels.join(", "))
            }
            UploadError::Persistence { source, .. } => {
                format!("Gagal menyimpan data: {}", source.user_message())
            }
            UploadError::SubmitInProgress => "Sedang menyimpan, mohon tunggu".to_string(),
            UploadError::UploadsPending { .. } => {
                "Tunggu hingga semua file selesai diupload".to_string()
            }
            UploadError::Unexpected(_) => "Terjadi kesalahan, silakan coba lagi".to_string(),
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            UploadError::Validation(_)
            | UploadError::SubmitInProgress
            | UploadError::UploadsPending { .. } => LogLevel::Debug,
            UploadError::StagingUpload(_) | UploadError::Finalize { .. } => LogLevel::Warn,
            UploadError::Persistence { .. } | UploadError::Unexpected(_) => LogLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(label: &str) -> FailedField {
        FailedField {
            key: "coverImage".to_string(),
            label: label.to_string(),
            file_name: "cover.jpg".to_string(),
            message: "expired".to_string(),
        }
    }

    #[test]
    fn test_finalize_message_counts_failed_files() {
        let err = UploadError::Finalize {
            failed: vec![failed("Gambar sampul")],
        };
        assert!(err.client_message().starts_with("1 file gagal diupload"));
        assert!(err.client_message().contains("Gambar sampul"));
        assert_eq!(err.error_code(), "FINALIZE_FAILED");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_unexpected_error_hides_details() {
        let err = UploadError::from(anyhow::anyhow!("missing tempId in response"));
        assert_eq!(err.client_message(), "Terjadi kesalahan, silakan coba lagi");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_server_client_error_message() {
        let err = ClientError::Server {
            status: 422,
            message: "Folder tidak valid".to_string(),
        };
        assert_eq!(err.user_message(), "Folder tidak valid");

        let err = ClientError::Server {
            status: 502,
            message: "<html>bad gateway</html>".to_string(),
        };
        assert_eq!(err.user_message(), "Terjadi kesalahan pada server");
    }

    #[test]
    fn test_validation_is_not_recoverable() {
        let err = UploadError::from(ValidationError::EmptyFile);
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }
}

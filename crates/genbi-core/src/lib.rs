//! GenBI Core Library
//!
//! Domain models, error types, configuration, validation and collaborator
//! traits shared by the upload client, the upload lifecycle crate and the CLI.

pub mod config;
pub mod draft;
pub mod error;
pub mod models;
pub mod staging;
pub mod validation;

// Re-export commonly used types
pub use config::{ClientConfig, UploadDefaults};
pub use draft::{Draft, DraftPolicy, DraftStore, FileDraftStore, MemoryDraftStore};
pub use error::{ClientError, ErrorMetadata, FailedField, LogLevel, UploadError};
pub use staging::{ClientResult, PersistMethod, PersistTarget, RecordPersistence, StagingClient};
pub use validation::{AcceptPattern, FileValidator, ValidationError};

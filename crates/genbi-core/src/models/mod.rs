//! Domain models for staged uploads

pub mod staging;
pub mod upload;

pub use staging::{
    BulkFinalizeOutcome, FinalizeFailure, FinalizeItem, FinalizedItem, FinalizedUpload,
    StagedUpload,
};
pub use upload::{guess_mime_type, FileOrigin, OriginKind, RawFile, UploadableFile};

//! Upload staging and deferred finalize for the GenBI admin console
//!
//! A form owns a set of upload fields. Each field keeps its value consistent
//! with what the user sees (local preview, staged file, permanent file) and
//! the form makes every pending file permanent before the record is saved.

pub mod autosave;
pub mod cleanup;
pub mod field;
pub mod orchestrator;
pub mod scope;
pub mod tracker;

pub use autosave::DraftAutosaver;
pub use cleanup::PendingCleanup;
pub use field::{ChangeListener, FieldConfig, FieldStatus, FieldUploadController, UploadMode};
pub use orchestrator::{
    build_payload, FieldSnapshot, FinalizeStrategy, PayloadSection, SubmitOutcome, SubmitPhase,
    SubmitPlan, UploadForm,
};
pub use scope::MountScope;
pub use tracker::{InMemoryPreviews, ObjectUrlTracker, PreviewBackend};

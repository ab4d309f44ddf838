use anyhow::Context;
use genbi_core::models::{FinalizeItem, RawFile};
use genbi_core::UploadDefaults;
use std::path::Path;

/// Read a local file for upload, enforcing the configured size limit.
pub fn load_file(path: &Path, defaults: &UploadDefaults) -> anyhow::Result<RawFile> {
    let file = RawFile::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if file.size_bytes() > defaults.max_upload_bytes {
        anyhow::bail!(
            "{} is {} bytes; the limit is {} bytes (GENBI_MAX_UPLOAD_MB)",
            path.display(),
            file.size_bytes(),
            defaults.max_upload_bytes
        );
    }
    Ok(file)
}

/// Folder from the command line, or the configured default.
pub fn resolve_folder(folder: Option<String>, defaults: &UploadDefaults) -> String {
    folder
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| defaults.folder.clone())
}

pub fn finalize_items(staging_ids: &[String], folder: &str) -> Vec<FinalizeItem> {
    staging_ids
        .iter()
        .map(|id| FinalizeItem {
            staging_id: id.clone(),
            folder: folder.to_string(),
        })
        .collect()
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

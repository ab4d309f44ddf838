//! Best-effort cleanup of staged artifacts
//!
//! Deleting a staged upload never blocks or fails a user-visible flow. Errors
//! go to the log and are otherwise dropped; temporary storage expires the
//! artifact on its own.

use genbi_core::StagingClient;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Delete a staged artifact, logging instead of returning failures.
pub(crate) async fn discard_staged(client: &dyn StagingClient, staging_id: &str) {
    if let Err(e) = client.delete_staged(staging_id).await {
        tracing::warn!(
            error = %e,
            staging_id = %staging_id,
            "Failed to delete staged upload"
        );
    } else {
        tracing::debug!(staging_id = %staging_id, "Deleted staged upload");
    }
}

/// Detached cleanup started by a synchronous state change (remove, clear,
/// replace). Dropping it leaves the deletes running in the background.
#[derive(Debug, Default)]
pub struct PendingCleanup {
    handles: Vec<JoinHandle<()>>,
}

impl PendingCleanup {
    pub(crate) fn discard(&mut self, client: Arc<dyn StagingClient>, staging_id: String) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                self.handles.push(runtime.spawn(async move {
                    discard_staged(client.as_ref(), &staging_id).await;
                }));
            }
            Err(_) => {
                tracing::warn!(
                    staging_id = %staging_id,
                    "No async runtime available; staged upload left to expire"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every started delete to finish.
    pub async fn finished(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Staged upload cleanup task failed");
            }
        }
    }
}

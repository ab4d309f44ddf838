//! Debounced draft autosave
//!
//! Every form change schedules a save; only the last change inside the
//! debounce window reaches the store. Drafts go through `DraftPolicy`, so
//! credentials and local preview references never land on disk.

use chrono::Utc;
use genbi_core::draft::load_fresh;
use genbi_core::{Draft, DraftPolicy, DraftStore, UploadDefaults};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct DraftAutosaver {
    store: Arc<dyn DraftStore>,
    policy: Arc<DraftPolicy>,
    form_key: String,
    debounce: Duration,
    generation: Arc<AtomicU64>,
}

impl DraftAutosaver {
    pub fn new(
        store: Arc<dyn DraftStore>,
        policy: DraftPolicy,
        form_key: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            policy: Arc::new(policy),
            form_key: form_key.into(),
            debounce,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_defaults(
        store: Arc<dyn DraftStore>,
        form_key: impl Into<String>,
        defaults: &UploadDefaults,
    ) -> Self {
        Self::new(
            store,
            DraftPolicy::new(chrono::Duration::hours(defaults.draft_ttl_hours)),
            form_key,
            Duration::from_millis(defaults.draft_debounce_ms),
        )
    }

    pub fn form_key(&self) -> &str {
        &self.form_key
    }

    /// Save `state` once the debounce window passes without a newer change.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, state: Value) -> JoinHandle<()> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let current = self.generation.clone();
        let store = self.store.clone();
        let policy = self.policy.clone();
        let form_key = self.form_key.clone();
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if current.load(Ordering::Acquire) != generation {
                return;
            }

            let draft = Draft {
                form_key: form_key.clone(),
                saved_at: Utc::now(),
                data: policy.sanitize(&state),
            };
            match tokio::task::spawn_blocking(move || store.save(&draft)).await {
                Ok(Ok(())) => tracing::debug!(form_key = %form_key, "Draft saved"),
                Ok(Err(e)) => tracing::warn!(error = %e, form_key = %form_key, "Failed to save draft"),
                Err(e) => tracing::error!(error = %e, form_key = %form_key, "Draft save task failed"),
            }
        })
    }

    /// Save immediately, cancelling any scheduled save.
    pub fn save_now(&self, state: &Value) -> anyhow::Result<()> {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.store.save(&Draft {
            form_key: self.form_key.clone(),
            saved_at: Utc::now(),
            data: self.policy.sanitize(state),
        })
    }

    /// The saved draft, unless it has expired.
    pub fn restore(&self) -> anyhow::Result<Option<Value>> {
        Ok(load_fresh(self.store.as_ref(), &self.policy, &self.form_key, Utc::now())?
            .map(|draft| draft.data))
    }

    /// Drop the draft, e.g. after a successful submit. Pending saves are cancelled.
    pub fn discard(&self) -> anyhow::Result<()> {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.store.remove(&self.form_key)
    }
}

impl std::fmt::Debug for DraftAutosaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftAutosaver")
            .field("form_key", &self.form_key)
            .field("debounce", &self.debounce)
            .finish()
    }
}

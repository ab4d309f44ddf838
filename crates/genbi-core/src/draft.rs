//! Form drafts
//!
//! A draft is the persistable subset of a form's state. `DraftPolicy::sanitize`
//! is pure: it strips secret-like keys and anything that refers to an
//! in-memory file (a `LOCAL_PENDING` value or a `blob:` preview reference),
//! since neither survives a reload.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DEFAULT_DENIED_KEYS: &[&str] = &[
    "password",
    "passwordconfirmation",
    "token",
    "accesstoken",
    "refreshtoken",
    "secret",
    "apikey",
    "otp",
];

/// Which parts of a form state may be written to a draft, and for how long.
#[derive(Debug, Clone)]
pub struct DraftPolicy {
    denied_keys: Vec<String>,
    ttl: Duration,
}

impl DraftPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            denied_keys: DEFAULT_DENIED_KEYS.iter().map(|k| k.to_string()).collect(),
            ttl,
        }
    }

    /// Deny an additional key (compared case-insensitively, ignoring `_`/`-`).
    pub fn deny_key(mut self, key: &str) -> Self {
        self.denied_keys.push(normalize_key(key));
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_denied(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.denied_keys.iter().any(|d| *d == key)
    }

    /// Persistable subset of `state`.
    pub fn sanitize(&self, state: &Value) -> Value {
        self.sanitize_value(state).unwrap_or(Value::Null)
    }

    fn sanitize_value(&self, value: &Value) -> Option<Value> {
        match value {
            Value::String(s) if s.starts_with("blob:") => None,
            Value::Object(map) => {
                if map.get("originKind").and_then(Value::as_str) == Some("LOCAL_PENDING") {
                    return None;
                }
                let mut out = Map::new();
                for (key, v) in map {
                    if self.is_denied(key) {
                        continue;
                    }
                    if let Some(clean) = self.sanitize_value(v) {
                        out.insert(key.clone(), clean);
                    }
                }
                Some(Value::Object(out))
            }
            Value::Array(items) => Some(Value::Array(
                items.iter().filter_map(|v| self.sanitize_value(v)).collect(),
            )),
            other => Some(other.clone()),
        }
    }

    pub fn is_expired(&self, draft: &Draft, now: DateTime<Utc>) -> bool {
        now - draft.saved_at > self.ttl
    }
}

impl Default for DraftPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// A saved draft for one form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub form_key: String,
    pub saved_at: DateTime<Utc>,
    pub data: Value,
}

/// Storage for drafts, keyed by form.
pub trait DraftStore: Send + Sync {
    fn save(&self, draft: &Draft) -> anyhow::Result<()>;
    fn load(&self, form_key: &str) -> anyhow::Result<Option<Draft>>;
    fn remove(&self, form_key: &str) -> anyhow::Result<()>;
}

/// Load a draft, discarding (and removing) it when older than the policy TTL.
pub fn load_fresh(
    store: &dyn DraftStore,
    policy: &DraftPolicy,
    form_key: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Draft>> {
    match store.load(form_key)? {
        Some(draft) if policy.is_expired(&draft, now) => {
            tracing::debug!(form_key = %form_key, saved_at = %draft.saved_at, "Discarding expired draft");
            store.remove(form_key)?;
            Ok(None)
        }
        other => Ok(other),
    }
}

/// One JSON file per form under a directory.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create draft directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, form_key: &str) -> PathBuf {
        let safe: String = form_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("draft_{}.json", safe))
    }
}

impl DraftStore for FileDraftStore {
    fn save(&self, draft: &Draft) -> anyhow::Result<()> {
        let path = self.path_for(&draft.form_key);
        let body = serde_json::to_vec(draft).context("Failed to serialize draft")?;
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write draft: {}", path.display()))
    }

    fn load(&self, form_key: &str) -> anyhow::Result<Option<Draft>> {
        let path = self.path_for(form_key);
        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read draft: {}", path.display()))
            }
        };
        match serde_json::from_slice(&body) {
            Ok(draft) => Ok(Some(draft)),
            Err(e) => {
                // Corrupt drafts are dropped rather than blocking the form
                tracing::warn!(error = %e, path = %path.display(), "Discarding unreadable draft");
                self.remove(form_key)?;
                Ok(None)
            }
        }
    }

    fn remove(&self, form_key: &str) -> anyhow::Result<()> {
        let path = self.path_for(form_key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove draft: {}", path.display())),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<String, Draft>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftStore for MemoryDraftStore {
    fn save(&self, draft: &Draft) -> anyhow::Result<()> {
        let mut drafts = self
            .drafts
            .lock()
            .map_err(|_| anyhow::anyhow!("draft store lock poisoned"))?;
        drafts.insert(draft.form_key.clone(), draft.clone());
        Ok(())
    }

    fn load(&self, form_key: &str) -> anyhow::Result<Option<Draft>> {
        let drafts = self
            .drafts
            .lock()
            .map_err(|_| anyhow::anyhow!("draft store lock poisoned"))?;
        Ok(drafts.get(form_key).cloned())
    }

    fn remove(&self, form_key: &str) -> anyhow::Result<()> {
        let mut drafts = self
            .drafts
            .lock()
            .map_err(|_| anyhow::anyhow!("draft store lock poisoned"))?;
        drafts.remove(form_key);
        Ok(())
    }
}

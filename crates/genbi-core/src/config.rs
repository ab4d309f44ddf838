//! Configuration module
//!
//! Environment-driven settings for the API client and for upload/draft
//! defaults. `.env` is loaded first when present.

use std::env;

// Common constants
const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_API_VERSION: &str = "v1";
const HTTP_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPLOAD_FOLDER: &str = "uploads";
const MAX_UPLOAD_MB: u64 = 5;
const DRAFT_TTL_HOURS: i64 = 24;
const DRAFT_DEBOUNCE_MS: u64 = 1000;

/// Connection settings for the admin REST backend.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as `Authorization: Bearer {token}` when set
    pub api_token: Option<String>,
    /// Sent as `X-API-Key` when no token is set
    pub api_key: Option<String>,
    pub api_version: String,
    pub http_timeout_secs: u64,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let base_url = env::var("GENBI_API_URL")
            .or_else(|_| env::var("API_URL"))
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "GENBI_API_URL must start with http:// or https:// (got '{}')",
                base_url
            ));
        }

        let api_token = env::var("GENBI_API_TOKEN").ok().filter(|s| !s.trim().is_empty());
        let api_key = env::var("GENBI_API_KEY").ok().filter(|s| !s.trim().is_empty());

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            api_key,
            api_version: env::var("GENBI_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
            http_timeout_secs: env::var("GENBI_HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| HTTP_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(HTTP_TIMEOUT_SECS),
        })
    }

    /// API prefix (e.g. "/api/v1").
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            api_key: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            http_timeout_secs: HTTP_TIMEOUT_SECS,
        }
    }
}

/// Defaults applied to upload fields and the draft autosave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadDefaults {
    /// Destination folder in permanent storage when a field doesn't set one
    pub folder: String,
    pub max_upload_bytes: u64,
    pub draft_ttl_hours: i64,
    pub draft_debounce_ms: u64,
}

impl UploadDefaults {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let max_upload_mb = env::var("GENBI_MAX_UPLOAD_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_UPLOAD_MB);

        Self {
            folder: env::var("GENBI_UPLOAD_FOLDER")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string()),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            draft_ttl_hours: env::var("GENBI_DRAFT_TTL_HOURS")
                .unwrap_or_else(|_| DRAFT_TTL_HOURS.to_string())
                .parse()
                .unwrap_or(DRAFT_TTL_HOURS),
            draft_debounce_ms: env::var("GENBI_DRAFT_DEBOUNCE_MS")
                .unwrap_or_else(|_| DRAFT_DEBOUNCE_MS.to_string())
                .parse()
                .unwrap_or(DRAFT_DEBOUNCE_MS),
        }
    }
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            folder: DEFAULT_UPLOAD_FOLDER.to_string(),
            max_upload_bytes: MAX_UPLOAD_MB * 1024 * 1024,
            draft_ttl_hours: DRAFT_TTL_HOURS,
            draft_debounce_ms: DRAFT_DEBOUNCE_MS,
        }
    }
}

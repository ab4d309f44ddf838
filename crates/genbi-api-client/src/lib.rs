//! HTTP client for the GenBI admin API.
//!
//! Provides a minimal client with configurable auth (Bearer token or X-API-Key)
//! and the upload lifecycle operations
//! (staging, finalize, bulk finalize, delete staged, direct upload) plus
//! record persistence. The CLI and the upload lifecycle crate use it through
//! the `genbi_core` collaborator traits.

pub mod api;

use anyhow::{Context, Result};
use genbi_core::{ClientConfig, ClientError, ClientResult};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Authentication strategy for the API.
#[derive(Clone, Debug)]
pub enum Auth {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// `X-API-Key: {key}`
    XApiKey(String),
}

/// HTTP client for the GenBI admin API with configurable auth.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_prefix: String,
    auth: Auth,
}

impl ApiClient {
    pub fn new(base_url: String, auth: Auth) -> Result<Self> {
        Self::with_timeout(base_url, auth, Duration::from_secs(60))
    }

    pub fn with_timeout(base_url: String, auth: Auth, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            auth,
        })
    }

    /// Build a client from `ClientConfig`. A bearer token wins over an API key.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let auth = match (&config.api_token, &config.api_key) {
            (Some(token), _) => Auth::Bearer(token.clone()),
            (None, Some(key)) => Auth::XApiKey(key.clone()),
            (None, None) => {
                return Err(anyhow::anyhow!(
                    "Missing credentials. Set GENBI_API_TOKEN or GENBI_API_KEY"
                ))
            }
        };

        let client = Self::with_timeout(
            config.base_url.clone(),
            auth,
            Duration::from_secs(config.http_timeout_secs),
        )?;
        Ok(client.with_api_prefix(config.api_prefix()))
    }

    /// Create client from environment (see `ClientConfig::from_env`).
    pub fn from_env() -> Result<Self> {
        let config = ClientConfig::from_env()?;
        Self::from_config(&config)
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.api_prefix = format!("/{}", prefix.trim_matches('/'));
        self
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// URL for a path under the API prefix, e.g. `uploads/temp`.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            self.api_prefix,
            path.trim_start_matches('/')
        )
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.header("Authorization", format!("Bearer {}", token)),
            Auth::XApiKey(key) => request.header("X-API-Key", key.as_str()),
        }
    }

    /// Send a request and return the JSON body with the `{ success, data }`
    /// envelope unwrapped. Empty bodies become `Value::Null`.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> ClientResult<Value> {
        let response = self
            .apply_auth(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(error_from_body(status, &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| {
            ClientError::MalformedResponse(format!("Failed to parse response as JSON: {}", e))
        })?;

        Ok(unwrap_envelope(body))
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> ClientResult<T> {
    serde_json::from_value(body)
        .map_err(|e| ClientError::MalformedResponse(format!("Unexpected response shape: {}", e)))
}

fn map_transport_error(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        ClientError::MalformedResponse(err.to_string())
    } else if let Some(status) = err.status() {
        ClientError::Server {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else {
        ClientError::Network(err.to_string())
    }
}

/// The backend wraps most payloads as `{ success, data, message }`.
fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("success") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Turn a non-2xx response into a `ClientError`.
///
/// A 409/410 that still names the permanent `url` means the staging id was
/// already consumed by an earlier finalize.
fn error_from_body(status: StatusCode, text: &str) -> ClientError {
    let parsed: Option<Value> = serde_json::from_str(text).ok();

    if matches!(status, StatusCode::CONFLICT | StatusCode::GONE) {
        let url = parsed.as_ref().and_then(|body| {
            body.get("url")
                .or_else(|| body.get("data").and_then(|d| d.get("url")))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        if let Some(url) = url {
            return ClientError::AlreadyFinalized { url };
        }
    }

    let message = parsed
        .as_ref()
        .and_then(|body| {
            body.get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                text.trim().to_string()
            }
        });

    ClientError::Server {
        status: status.as_u16(),
        message,
    }
}

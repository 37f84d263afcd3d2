//! Admin backend API access.
//!
//! `RemoteBackend` is the seam between the sync engine and the HTTP
//! transport: the engine only ever sees JSON in and JSON out, so tests can
//! script a mock backend and the cache-coherence and rollback properties
//! stay observable without a server. `HttpBackend` is the production
//! implementation over reqwest.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::SyncConfig;

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One remote call against the order resource tree. Implementations must
/// not retry on their own; retry/rollback policy belongs to the caller.
pub trait RemoteBackend: Send + Sync {
    fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> impl Future<Output = Result<Value, SyncError>> + Send;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the admin backend URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach admin backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid admin backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Not authorized for this system".to_string(),
        404 => "Order resource not found".to_string(),
        409 => "Order was changed by someone else".to_string(),
        s if s >= 500 => format!("Admin backend server error (HTTP {s})"),
        s => format!("Unexpected response from admin backend (HTTP {s})"),
    }
}

/// Build the failure message for a non-success response, preserving
/// whatever detail the error body carried.
fn remote_error_detail(status: StatusCode, body_text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body_text) {
        let message = json
            .get("error")
            .or_else(|| json.get("message"))
            .or_else(|| json.get("detail"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| status_error(status));
        let details = json.get("details").or_else(|| json.get("errors")).cloned();
        if let Some(details) = details {
            format!("{message} (HTTP {}): {}", status.as_u16(), details)
        } else {
            format!("{message} (HTTP {})", status.as_u16())
        }
    } else if !body_text.trim().is_empty() {
        format!(
            "{} (HTTP {}): {}",
            status_error(status),
            status.as_u16(),
            body_text.trim()
        )
    } else {
        format!("{} (HTTP {})", status_error(status), status.as_u16())
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Authenticated HTTP client for the admin backend.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let base_url = normalize_base_url(&config.base_url);
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RemoteBackend for HttpBackend {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, SyncError> {
        let full_url = format!("{}{path}", self.base_url);
        debug!(%method, path, "api request");

        let mut req = self
            .client
            .request(method, &full_url)
            .header("X-POS-API-Key", &self.api_key)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SyncError::Transport(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();

        if !status.is_success() {
            // Preserve validation details for the notification surface.
            let body_text = resp.text().await.unwrap_or_default();
            let detail = remote_error_detail(status, &body_text);
            warn!(path, status = status.as_u16(), "api request failed");
            return Err(SyncError::Remote(detail));
        }

        // Return the JSON body, or null for empty 204 responses.
        let body_text = resp.text().await.unwrap_or_default();
        if body_text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .map_err(|e| SyncError::Decode(format!("invalid JSON from admin backend: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Scripted backend for tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_scheme_and_loses_api_suffix() {
        assert_eq!(
            normalize_base_url("admin.example.com/api/"),
            "https://admin.example.com"
        );
        assert_eq!(
            normalize_base_url("localhost:8000"),
            "http://localhost:8000"
        );
        assert_eq!(
            normalize_base_url("https://admin.example.com///"),
            "https://admin.example.com"
        );
    }

    #[test]
    fn remote_error_prefers_body_message() {
        let detail = remote_error_detail(
            StatusCode::BAD_REQUEST,
            r#"{"error": "invalid transition", "details": {"status": "bad"}}"#,
        );
        assert!(
            detail.contains("invalid transition"),
            "body message should be preserved: {detail}"
        );
        assert!(detail.contains("400"));
    }

    #[test]
    fn remote_error_falls_back_to_status_text() {
        let detail = remote_error_detail(StatusCode::UNAUTHORIZED, "");
        assert_eq!(detail, "API key is invalid or expired (HTTP 401)");
    }
}

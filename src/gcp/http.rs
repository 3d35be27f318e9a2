//! HTTP utilities for GCP REST API calls

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A non-success answer from a GCP API
#[derive(Debug, Error)]
#[error("API request failed: {status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    /// `error.message` from the response body, when there is one
    pub message: String,
}

impl ApiError {
    fn from_body(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
        Self { status, message }
    }

    /// The API is not enabled for the project, so the resources it manages
    /// cannot exist there.
    pub fn is_service_disabled(&self) -> bool {
        if self.status != StatusCode::FORBIDDEN {
            return false;
        }
        let message = self.message.to_lowercase();
        message.contains("has not been used") || message.contains("is disabled")
    }
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
    in_flight: Option<Arc<Semaphore>>,
}

impl GcpHttpClient {
    /// Create a new HTTP client with no ceiling on concurrent requests
    pub fn new() -> Result<Self> {
        Self::with_max_in_flight(0)
    }

    /// Create a client allowing at most `max_in_flight` requests at once.
    /// Zero means unlimited.
    pub fn with_max_in_flight(max_in_flight: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gcpinv/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            in_flight: (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight))),
        })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url).bearer_auth(token)).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        self.send(request).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let _permit = match &self.in_flight {
            Some(semaphore) => Some(
                semaphore
                    .acquire()
                    .await
                    .context("HTTP request limiter closed")?,
            ),
            None => None,
        };

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(ApiError::from_body(status, &body).into());
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }
}

impl std::fmt::Debug for GcpHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpHttpClient")
            .field(
                "available_request_slots",
                &self.in_flight.as_ref().map(|s| s.available_permits()),
            )
            .finish()
    }
}

/// Find the API error behind an `anyhow` chain, if any
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ApiError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(200)));
        assert!(sanitized.ends_with("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_respects_char_boundaries() {
        let body = format!("{}é{}", "a".repeat(199), "b".repeat(100));
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"a".repeat(199)));
    }

    #[test]
    fn test_api_error_extracts_message() {
        let err = ApiError::from_body(
            StatusCode::FORBIDDEN,
            r#"{"error": {"code": 403, "message": "Kubernetes Engine API has not been used in project 123 before or it is disabled."}}"#,
        );
        assert!(err.is_service_disabled());
        assert_eq!(
            err.to_string(),
            "API request failed: 403 Forbidden: Kubernetes Engine API has not been used in project 123 before or it is disabled."
        );
    }

    #[test]
    fn test_plain_permission_denied_is_not_service_disabled() {
        let err = ApiError::from_body(
            StatusCode::FORBIDDEN,
            r#"{"error": {"message": "Permission denied on resource"}}"#,
        );
        assert!(!err.is_service_disabled());

        let err = ApiError::from_body(StatusCode::SERVICE_UNAVAILABLE, "not json");
        assert_eq!(err.message, "Service Unavailable");
    }

    #[test]
    fn test_api_error_found_through_context() {
        let err = anyhow::Error::from(ApiError::from_body(StatusCode::NOT_FOUND, ""))
            .context("listing clusters");
        assert_eq!(api_error(&err).unwrap().status, StatusCode::NOT_FOUND);
        assert!(api_error(&anyhow::anyhow!("other")).is_none());
    }
}

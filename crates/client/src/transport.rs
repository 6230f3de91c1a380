//! HTTP transport for query endpoints.
//!
//! [`Transport`] is the seam the rest of the SDK talks through; it POSTs a
//! JSON body and hands back the reply envelope. [`HttpTransport`] is the
//! reqwest-backed implementation. HTTP-level failures (non-2xx, empty body)
//! are folded into a `{success: false, error}` envelope here so the query
//! layer sees one shape; failures to reach the server at all stay errors.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Result, SdkError};

/// Header carrying the application key on every request.
pub const APP_KEY_HEADER: &str = "App-Key";

/// Request/response channel to the platform.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `path` (relative to the base URL) and return the reply envelope.
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    headers: RwLock<HeaderMap>,
}

impl HttpTransport {
    /// Create a transport for `base_url`, sending `app_key` on every request.
    pub fn new(base_url: &str, app_key: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| SdkError::Config(format!("invalid base URL '{base_url}': {e}")))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SdkError::Config(format!(
                    "unsupported base URL scheme: {scheme}"
                )));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {e}")))?;

        let transport = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: RwLock::new(HeaderMap::new()),
        };
        transport.set_header(APP_KEY_HEADER, app_key)?;

        Ok(transport)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Add or replace a header sent with every subsequent request.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| SdkError::InvalidHeader {
                name: name.to_string(),
                details: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| SdkError::InvalidHeader {
            name: name.to_string(),
            details: e.to_string(),
        })?;

        self.headers.write().insert(header_name, header_value);
        Ok(())
    }

    /// Stop sending a header. Unknown names are ignored.
    pub fn remove_header(&self, name: &str) {
        if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
            self.headers.write().remove(header_name);
        }
    }

    /// Send `Authorization: Bearer <token>` from now on.
    pub fn set_token(&self, token: &str) -> Result<()> {
        self.set_header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    pub fn clear_token(&self) {
        self.remove_header(AUTHORIZATION.as_str());
    }

    /// Whether a caller-set header named `name` is currently sent.
    pub fn has_header(&self, name: &str) -> bool {
        HeaderName::from_bytes(name.as_bytes())
            .is_ok_and(|header_name| self.headers.read().contains_key(header_name))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let headers = self.headers.read().clone();

        let response = self
            .client
            .post(self.endpoint(path))
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|source| SdkError::Http {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| SdkError::Http {
            path: path.to_string(),
            source,
        })?;

        debug!(path = %path, status = status.as_u16(), bytes = bytes.len(), "request completed");

        Ok(normalize_reply(status, &bytes))
    }
}

/// Fold an HTTP reply into the `{success, ...}` envelope.
///
/// A JSON object carrying `success` is passed through whatever the status.
/// Other 2xx JSON is passed through as-is. Everything else becomes
/// `{success: false}` with an explanatory `error` where one exists.
fn normalize_reply(status: StatusCode, bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes).ok() {
        Some(reply) if reply.get("success").is_some() => reply,
        _ if !status.is_success() => {
            warn!(status = status.as_u16(), "request rejected by server");
            json!({
                "success": false,
                "error": format!("Request failed with status code {}", status.as_u16()),
            })
        }
        Some(Value::Null) => json!({"success": false}),
        Some(reply) => reply,
        None if bytes.is_empty() => json!({"success": false}),
        None => json!({"success": false, "error": "reply body is not valid JSON"}),
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_passes_through_on_error_status() {
        let body = br#"{"success": false, "message": "bad query"}"#;
        let reply = normalize_reply(StatusCode::BAD_REQUEST, body);
        assert_eq!(reply["message"], "bad query");
    }

    #[test]
    fn bare_error_status_is_normalized() {
        let reply = normalize_reply(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>");
        assert_eq!(
            reply,
            json!({"success": false, "error": "Request failed with status code 500"})
        );
    }

    #[test]
    fn empty_success_body_is_a_failure() {
        assert_eq!(normalize_reply(StatusCode::OK, b""), json!({"success": false}));
        assert_eq!(normalize_reply(StatusCode::OK, b"null"), json!({"success": false}));
    }

    #[test]
    fn non_json_success_body_is_a_failure() {
        let reply = normalize_reply(StatusCode::OK, b"not json");
        assert_eq!(reply["success"], false);
        assert!(reply["error"].as_str().unwrap().contains("not valid JSON"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = HttpTransport::new("ftp://example.com", "key", Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("unsupported base URL scheme"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let transport =
            HttpTransport::new("https://sbxcloud.com/api/", "key", Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.endpoint("/data/v1/row/find"),
            "https://sbxcloud.com/api/data/v1/row/find"
        );
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let transport =
            HttpTransport::new("https://sbxcloud.com/api", "key", Duration::from_secs(1)).unwrap();
        assert!(transport.set_header("X-Trace", "bad\nvalue").is_err());
    }
}

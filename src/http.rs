use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = concat!("crm-batch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("{0}")]
    Envelope(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl HttpError {
    /// Network errors, server errors and rate limiting may succeed on a later
    /// attempt. Everything else is the request's fault.
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Network { .. } => true,
            HttpError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            HttpError::Envelope(_) | HttpError::Decode(_) => false,
        }
    }
}

/// Thin client for the managed backend's function endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POSTs `body` as JSON and decodes the response.
    ///
    /// A 2xx body that carries an `error` field is treated as a failure, the
    /// same as a non-2xx status.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(%url, "POST");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|source| HttpError::Network {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| HttpError::Network {
                url: url.clone(),
                source,
            })?;
        debug!(%url, status = status.as_u16(), bytes = text.len(), "response");

        if !status.is_success() {
            return Err(HttpError::Status {
                status,
                message: error_message_from_body(&text, status),
            });
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|err| HttpError::Decode(err.to_string()))?;
        if let Some(message) = envelope_error(&value) {
            return Err(HttpError::Envelope(message));
        }
        serde_json::from_value(value).map_err(|err| HttpError::Decode(err.to_string()))
    }
}

fn envelope_error(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(message) => Some(message.clone()),
        Value::Object(inner) => Some(
            inner
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| Value::Object(inner.clone()).to_string()),
        ),
        other => Some(other.to_string()),
    }
}

fn error_message_from_body(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = envelope_error(&value) {
            return message;
        }
        for key in ["message", "msg"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn envelope_error_variants() {
        assert_eq!(envelope_error(&json!({ "ok": true })), None);
        assert_eq!(envelope_error(&json!({ "error": null })), None);
        assert_eq!(
            envelope_error(&json!({ "error": "quota exceeded" })),
            Some("quota exceeded".to_string())
        );
        assert_eq!(
            envelope_error(&json!({ "error": { "message": "bad csv" } })),
            Some("bad csv".to_string())
        );
    }

    #[test]
    fn error_message_prefers_structured_fields() {
        assert_eq!(
            error_message_from_body(r#"{"message":"relation missing"}"#, StatusCode::BAD_REQUEST),
            "relation missing"
        );
        assert_eq!(
            error_message_from_body("  upstream timeout ", StatusCode::BAD_GATEWAY),
            "upstream timeout"
        );
        assert_eq!(
            error_message_from_body("", StatusCode::SERVICE_UNAVAILABLE),
            "Service Unavailable"
        );
    }

    #[test]
    fn retryable_statuses() {
        let status = |code: u16| HttpError::Status {
            status: StatusCode::from_u16(code).unwrap(),
            message: String::new(),
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!HttpError::Envelope("nope".into()).is_retryable());
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let client = ApiClient::new("https://db.example.com/", "key").unwrap();
        assert_eq!(
            client.url("/functions/v1/import-teams-batch"),
            "https://db.example.com/functions/v1/import-teams-batch"
        );
    }

    #[tokio::test]
    async fn post_json_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/echo"))
            .and(header("authorization", "Bearer secret"))
            .and(header("apikey", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": 7 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "secret").unwrap();
        let value: Value = client
            .post_json("/functions/v1/echo", &json!({}))
            .await
            .unwrap();
        assert_eq!(value["value"], 7);
    }

    #[tokio::test]
    async fn post_json_surfaces_error_envelope_on_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "error": "csv is empty" })),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "k").unwrap();
        let err = client
            .post_json::<_, Value>("/functions/v1/x", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Envelope(ref m) if m == "csv is empty"));
    }
}

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub method: reqwest::Method,
    pub content_type: String,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn post_json(url: impl Into<String>, body: Vec<u8>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: reqwest::Method::POST,
            content_type: JSON_CONTENT_TYPE.to_string(),
            body,
            timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("server returned {status} status: {body}")]
    Status { status: u16, body: String },
    #[error("request timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },
    #[error("request failed: {message}")]
    Request { message: String },
    #[error("response body is not json: {message}")]
    Decode { message: String },
}

/// Performs exactly one network call per request. Implementations must not
/// retry; a failed attempt is handed back unchanged.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<Value, TransportError> {
        let timeout = request.timeout;
        debug!(
            event = "transport_send",
            url = %request.url,
            bytes = request.body.len()
        );
        let response = self
            .http
            .request(request.method, request.url.as_str())
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .timeout(timeout)
            .body(request.body)
            .send()
            .await
            .map_err(|error| classify_reqwest_error(&error, timeout))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| classify_reqwest_error(&error, timeout))?;

        if !status.is_success() {
            return Err(format_http_error(status, &bytes));
        }

        serde_json::from_slice::<Value>(&bytes).map_err(|error| TransportError::Decode {
            message: error.to_string(),
        })
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> TransportError {
    let body = String::from_utf8_lossy(body).trim().to_string();
    TransportError::Status {
        status: status.as_u16(),
        body: if body.is_empty() {
            "<empty>".to_string()
        } else {
            body
        },
    }
}

fn classify_reqwest_error(error: &reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout { after: timeout };
    }
    TransportError::Request {
        message: error.to_string(),
    }
}

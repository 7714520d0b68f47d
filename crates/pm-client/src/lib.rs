use std::time::Duration;
use thiserror::Error;

pub mod exchange;
pub mod transport;

pub use exchange::{
    Exchange, ExchangeEvent, ExchangeListener, ExchangeOutcome, RpcClient, RpcError,
};
pub use transport::{HttpTransport, Transport, TransportError, TransportRequest};

pub const DEFAULT_ENDPOINT_PATH: &str = "/jsonrpc";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcClientConfig {
    pub base_url: String,
    pub endpoint_path: String,
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("base url is missing")]
    BaseUrlMissing,
    #[error("base url must start with http:// or https://: {0}")]
    UnsupportedScheme(String),
}

impl RpcClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_body_bytes: pm_core::jsonrpc::DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> Result<String, EndpointError> {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(EndpointError::BaseUrlMissing);
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(EndpointError::UnsupportedScheme(base.to_string()));
        }
        let path = self.endpoint_path.trim().trim_start_matches('/');
        if path.is_empty() {
            return Ok(base.to_string());
        }
        Ok(format!("{base}/{path}"))
    }
}

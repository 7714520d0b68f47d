use crate::transport::{Transport, TransportError, TransportRequest};
use crate::{EndpointError, RpcClientConfig};
use chrono::{DateTime, Utc};
use pm_core::jsonrpc::{
    decode_response, encode_request, new_request_id, CodecError, Params, ResponseError,
    RpcErrorObject, RpcRequest, JSONRPC_VERSION,
};
use pm_core::methods::RpcMethod;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Pending,
    Result(Value),
    RpcError(RpcErrorObject),
    TransportError(TransportError),
    ProtocolError(String),
}

impl ExchangeOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, ExchangeOutcome::Pending)
    }
}

/// One request/response cycle against the JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub id: String,
    pub method: String,
    pub params: Option<Value>,
    /// The body exactly as posted.
    pub request: Value,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: ExchangeOutcome,
}

impl Exchange {
    fn start(id: String, method: String, params: Option<Value>, request: Value) -> Self {
        Self {
            id,
            method,
            params,
            request,
            initiated_at: Utc::now(),
            completed_at: None,
            outcome: ExchangeOutcome::Pending,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Fills the completion fields. A settled exchange never changes again;
    /// returns false when it was already settled.
    pub fn settle(&mut self, completed_at: DateTime<Utc>, outcome: ExchangeOutcome) -> bool {
        if self.is_settled() {
            return false;
        }
        self.completed_at = Some(completed_at);
        self.outcome = outcome;
        true
    }

    /// Copies the completion of `settled` into this record if it is the same
    /// exchange and this record is still open.
    pub fn absorb(&mut self, settled: &Exchange) -> bool {
        if self.id != settled.id {
            return false;
        }
        match settled.completed_at {
            Some(at) => self.settle(at, settled.outcome.clone()),
            None => false,
        }
    }

    pub fn latency_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.initiated_at).num_milliseconds())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    Started(Exchange),
    Settled(Exchange),
}

impl ExchangeEvent {
    pub fn exchange(&self) -> &Exchange {
        match self {
            ExchangeEvent::Started(exchange) | ExchangeEvent::Settled(exchange) => exchange,
        }
    }
}

/// Receives every exchange once when it starts and once when it settles.
pub trait ExchangeListener: Send + Sync {
    fn on_exchange(&self, event: ExchangeEvent);
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("rpc error: {0}")]
    Application(RpcErrorObject),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("unexpected result for {method}: {message}")]
    Decode { method: String, message: String },
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl RpcError {
    pub fn application(&self) -> Option<&RpcErrorObject> {
        match self {
            RpcError::Application(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self, unauthorized_code: i64) -> bool {
        self.application()
            .map(|error| error.is_unauthorized(unauthorized_code))
            .unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    config: RpcClientConfig,
    url: String,
    listener: Option<Arc<dyn ExchangeListener>>,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("url", &self.url)
            .field("timeout", &self.config.timeout)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl RpcClient {
    pub fn new(config: RpcClientConfig, transport: Arc<dyn Transport>) -> Result<Self, RpcError> {
        let url = config.endpoint()?;
        Ok(Self {
            transport,
            config,
            url,
            listener: None,
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn ExchangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub async fn invoke<M: RpcMethod>(
        &self,
        method: &M,
        authorization: Option<&str>,
    ) -> Result<M::Output, RpcError> {
        let name = method.name();
        let authorization = if method.requires_authorization() {
            authorization
        } else {
            None
        };
        let result = self.call(&name, method.params(), authorization).await?;
        serde_json::from_value(result).map_err(|err| RpcError::Decode {
            method: name,
            message: err.to_string(),
        })
    }

    pub async fn call(
        &self,
        method: &str,
        params: Option<Params>,
        authorization: Option<&str>,
    ) -> Result<Value, RpcError> {
        let request = RpcRequest::new(method, params)
            .with_authorization(authorization.map(|token| token.to_string()));
        let body = serde_json::to_value(&request)
            .map_err(|err| RpcError::Codec(CodecError::Encode(err.to_string())))?;
        self.execute(
            request.id,
            request.method,
            request.params.map(|params| params.to_value()),
            body,
        )
        .await
    }

    /// Sends a user-composed request object verbatim, stamping `jsonrpc` and a
    /// fresh `id` the way every other exchange gets them.
    pub async fn call_raw(&self, raw: Value) -> Result<Value, RpcError> {
        let mut object = match raw {
            Value::Object(object) => object,
            other => {
                return Err(RpcError::Protocol(format!(
                    "request must be a json object, got {other}"
                )))
            }
        };
        let id = new_request_id();
        object.insert(
            "jsonrpc".to_string(),
            Value::String(JSONRPC_VERSION.to_string()),
        );
        object.insert("id".to_string(), Value::String(id.clone()));
        let method = object
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let params = object.get("params").cloned();
        self.execute(id, method, params, Value::Object(object)).await
    }

    async fn execute(
        &self,
        id: String,
        method: String,
        params: Option<Value>,
        body: Value,
    ) -> Result<Value, RpcError> {
        let mut exchange = Exchange::start(id, method, params, body);
        self.emit(ExchangeEvent::Started(exchange.clone()));
        debug!(
            event = "rpc_exchange_started",
            id = %exchange.id,
            method = %exchange.method
        );

        let outcome = self.round_trip(&exchange).await;
        let recorded = match &outcome {
            Ok(result) => ExchangeOutcome::Result(result.clone()),
            Err(RpcError::Application(error)) => ExchangeOutcome::RpcError(error.clone()),
            Err(RpcError::Transport(error)) => ExchangeOutcome::TransportError(error.clone()),
            Err(other) => ExchangeOutcome::ProtocolError(other.to_string()),
        };
        exchange.settle(Utc::now(), recorded);

        match &outcome {
            Ok(_) => debug!(
                event = "rpc_exchange_settled",
                id = %exchange.id,
                method = %exchange.method,
                latency_ms = exchange.latency_ms().unwrap_or_default()
            ),
            Err(err) => warn!(
                event = "rpc_exchange_failed",
                id = %exchange.id,
                method = %exchange.method,
                latency_ms = exchange.latency_ms().unwrap_or_default(),
                error = %err
            ),
        }
        self.emit(ExchangeEvent::Settled(exchange));
        outcome
    }

    async fn round_trip(&self, exchange: &Exchange) -> Result<Value, RpcError> {
        let bytes = encode_request(&exchange.request, self.config.max_body_bytes)?;
        let request = TransportRequest::post_json(self.url.clone(), bytes, self.config.timeout);
        let reply = self.transport.send(request).await?;
        let response = decode_response(reply)?;

        if let Some(echoed) = response.id.as_deref() {
            if echoed != exchange.id {
                return Err(RpcError::Protocol(format!(
                    "response id {echoed} does not match request id {}",
                    exchange.id
                )));
            }
        }

        response.into_outcome().map_err(|err| match err {
            ResponseError::Application(error) => RpcError::Application(error),
            ResponseError::MissingResult => RpcError::Protocol(err.to_string()),
        })
    }

    fn emit(&self, event: ExchangeEvent) {
        if let Some(listener) = self.listener.as_ref() {
            listener.on_exchange(event);
        }
    }
}

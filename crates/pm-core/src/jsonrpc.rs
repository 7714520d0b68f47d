use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
pub const JSONRPC_VERSION: &str = "2.0";

/// Code the platform manager answers with when the authorization token is
/// missing, expired or wrong.
pub const UNAUTHORIZED_CODE: i64 = 401;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct JsonRpcVersionVisitor;

        impl<'de> Visitor<'de> for JsonRpcVersionVisitor {
            type Value = JsonRpcVersion;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("the string \"2.0\"")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value.trim() == JSONRPC_VERSION {
                    Ok(JsonRpcVersion)
                } else {
                    Err(E::custom(format!("unsupported jsonrpc version '{value}'")))
                }
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if (value - 2.0).abs() < f64::EPSILON {
                    Ok(JsonRpcVersion)
                } else {
                    Err(E::custom(format!("unsupported jsonrpc version {value}")))
                }
            }
        }

        deserializer.deserialize_any(JsonRpcVersionVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Params {
    pub fn positional<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Params::Positional(values.into_iter().collect())
    }

    pub fn to_value(&self) -> Value {
        match self {
            Params::Positional(values) => Value::Array(values.clone()),
            Params::Named(map) => Value::Object(map.clone()),
        }
    }
}

/// A JSON-RPC 2.0 request plus the platform manager's out-of-band
/// `authorization` member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: JsonRpcVersion,
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: new_request_id(),
            method: method.into(),
            params,
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self
    }
}

pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_unauthorized(&self, unauthorized_code: i64) -> bool {
        self.code == unauthorized_code
    }
}

impl fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<JsonRpcVersion>,
    #[serde(default, deserialize_with = "deserialize_response_id")]
    pub id: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// An `error` member wins over `result` when a server sends both.
    pub fn into_outcome(self) -> Result<Value, ResponseError> {
        if let Some(error) = self.error {
            return Err(ResponseError::Application(error));
        }
        match self.result {
            Some(result) => Ok(result),
            None => Err(ResponseError::MissingResult),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("rpc error: {0}")]
    Application(RpcErrorObject),
    #[error("response carries neither result nor error")]
    MissingResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("body exceeds max size: {size} > {max}")]
    OversizedBody { size: usize, max: usize },
    #[error("request encode failed: {0}")]
    Encode(String),
    #[error("response decode failed: {0}")]
    Decode(String),
}

pub fn encode_request<T: Serialize>(
    request: &T,
    max_body_bytes: usize,
) -> Result<Vec<u8>, CodecError> {
    let encoded =
        serde_json::to_vec(request).map_err(|err| CodecError::Encode(err.to_string()))?;
    if encoded.len() > max_body_bytes {
        return Err(CodecError::OversizedBody {
            size: encoded.len(),
            max: max_body_bytes,
        });
    }
    Ok(encoded)
}

pub fn decode_response(value: Value) -> Result<RpcResponse, CodecError> {
    serde_json::from_value(value).map_err(|err| CodecError::Decode(err.to_string()))
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn deserialize_response_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(de::Error::custom("expected string, number or null for id")),
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub mod jsonrpc;
pub mod methods;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformSummary {
    #[serde(deserialize_with = "deserialize_id")]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSummary {
    #[serde(deserialize_with = "deserialize_id")]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// Process state reported by `status_agents`, `start_agent` and `stop_agent`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProcessStatus {
    #[serde(default)]
    pub process_id: Option<i64>,
    #[serde(default)]
    pub return_code: Option<i64>,
}

impl ProcessStatus {
    pub const NEVER_STARTED: Self = Self {
        process_id: None,
        return_code: None,
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentStatusEntry {
    #[serde(deserialize_with = "deserialize_id")]
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub status: ProcessStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentAction {
    Start,
    Stop,
}

impl AgentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentAction::Start => "start",
            AgentAction::Stop => "stop",
        }
    }
}

impl fmt::Display for AgentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an agent row shows. Derived from the snapshot, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentDisplayState {
    Unknown,
    NeverStarted,
    Running { process_id: i64 },
    Stopped { return_code: i64 },
    Starting,
    Stopping,
}

impl AgentDisplayState {
    /// `action_pending` is `None` until the first status for the agent arrives.
    pub fn derive(action_pending: Option<bool>, status: ProcessStatus) -> Self {
        match action_pending {
            None => AgentDisplayState::Unknown,
            Some(true) => {
                if status.process_id.is_none() || status.return_code.is_some() {
                    AgentDisplayState::Starting
                } else {
                    AgentDisplayState::Stopping
                }
            }
            Some(false) => match (status.process_id, status.return_code) {
                (None, _) => AgentDisplayState::NeverStarted,
                (Some(process_id), None) => AgentDisplayState::Running { process_id },
                (Some(_), Some(return_code)) => AgentDisplayState::Stopped { return_code },
            },
        }
    }

    /// The action a user can take from this state, if any.
    pub fn available_action(&self) -> Option<AgentAction> {
        match self {
            AgentDisplayState::NeverStarted | AgentDisplayState::Stopped { .. } => {
                Some(AgentAction::Start)
            }
            AgentDisplayState::Running { .. } => Some(AgentAction::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for AgentDisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentDisplayState::Unknown => f.write_str("Retrieving status..."),
            AgentDisplayState::NeverStarted => f.write_str("Never started"),
            AgentDisplayState::Running { process_id } => write!(f, "Running (PID {process_id})"),
            AgentDisplayState::Stopped { return_code } => {
                write!(f, "Stopped (returned {return_code})")
            }
            AgentDisplayState::Starting => f.write_str("Starting..."),
            AgentDisplayState::Stopping => f.write_str("Stopping..."),
        }
    }
}

/// Deserialize an id that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

//! Remote methods exposed by the platform manager, one type per method.
//!
//! Each method knows its wire name, its params and the shape of its result,
//! so a reply is checked at the serialization boundary instead of deep inside
//! a store.

use crate::jsonrpc::Params;
use crate::{AgentAction, AgentStatusEntry, AgentSummary, PlatformSummary, ProcessStatus};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

pub const GET_AUTHORIZATION: &str = "get_authorization";
pub const LIST_PLATFORMS: &str = "list_platforms";
const PLATFORM_PREFIX: &str = "platforms.uuid.";

pub trait RpcMethod {
    type Output: DeserializeOwned;

    fn name(&self) -> String;

    fn params(&self) -> Option<Params> {
        None
    }

    /// Whether the call needs the session token attached.
    fn requires_authorization(&self) -> bool {
        true
    }
}

/// `platforms.uuid.<platform>.<leaf>`
pub fn platform_method(platform_uuid: &str, leaf: &str) -> String {
    format!("{PLATFORM_PREFIX}{platform_uuid}.{leaf}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAuthorization {
    pub username: String,
    pub password: String,
}

impl RpcMethod for GetAuthorization {
    type Output = String;

    fn name(&self) -> String {
        GET_AUTHORIZATION.to_string()
    }

    fn params(&self) -> Option<Params> {
        let mut named = Map::new();
        named.insert("username".to_string(), json!(self.username));
        named.insert("password".to_string(), json!(self.password));
        Some(Params::Named(named))
    }

    fn requires_authorization(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListPlatforms;

impl RpcMethod for ListPlatforms {
    type Output = Vec<PlatformSummary>;

    fn name(&self) -> String {
        LIST_PLATFORMS.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAgents {
    pub platform_uuid: String,
}

impl RpcMethod for ListAgents {
    type Output = Vec<AgentSummary>;

    fn name(&self) -> String {
        platform_method(&self.platform_uuid, "list_agents")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAgents {
    pub platform_uuid: String,
}

impl RpcMethod for StatusAgents {
    type Output = Vec<AgentStatusEntry>;

    fn name(&self) -> String {
        platform_method(&self.platform_uuid, "status_agents")
    }
}

/// `start_agent` / `stop_agent`. Some platforms answer with `null`, hence the
/// optional status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlAgent {
    pub platform_uuid: String,
    pub agent_uuid: String,
    pub action: AgentAction,
}

impl RpcMethod for ControlAgent {
    type Output = Option<ProcessStatus>;

    fn name(&self) -> String {
        let leaf = match self.action {
            AgentAction::Start => "start_agent",
            AgentAction::Stop => "stop_agent",
        };
        platform_method(&self.platform_uuid, leaf)
    }

    fn params(&self) -> Option<Params> {
        Some(Params::positional([Value::String(self.agent_uuid.clone())]))
    }
}

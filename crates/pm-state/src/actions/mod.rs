use pm_client::{RpcClient, RpcError};
use pm_core::jsonrpc::RpcErrorObject;
use std::sync::Arc;
use thiserror::Error;

use crate::dispatcher::Dispatcher;
use crate::Settings;

mod console;
mod platform_manager;

pub use console::ConsoleActions;
pub use platform_manager::{LoginOutcome, PlatformManagerActions};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("not authorized: {0}")]
    Unauthorized(RpcErrorObject),
    #[error("unknown agent {agent_uuid} on platform {platform_uuid}")]
    UnknownAgent {
        platform_uuid: String,
        agent_uuid: String,
    },
    #[error("composer value is not valid json: {0}")]
    InvalidComposer(String),
}

/// Both action-creator families wired to one dispatcher. The client passed
/// in gets the dispatcher attached as its exchange listener.
#[derive(Debug, Clone)]
pub struct ActionCreators {
    pub platform_manager: PlatformManagerActions,
    pub console: ConsoleActions,
}

impl ActionCreators {
    pub fn new(rpc: RpcClient, dispatcher: Dispatcher, settings: Settings) -> Self {
        let rpc = rpc.with_listener(Arc::new(dispatcher.clone()));
        Self {
            platform_manager: PlatformManagerActions::new(
                rpc.clone(),
                dispatcher.clone(),
                settings,
            ),
            console: ConsoleActions::new(rpc, dispatcher),
        }
    }
}

//! Client-side state for the platform manager: typed actions, the stores
//! they update, the dispatcher that serializes updates, and the action
//! creators that turn user intents into RPC exchanges.

use pm_core::jsonrpc::UNAUTHORIZED_CODE;

pub mod action;
pub mod actions;
pub mod dispatcher;
pub mod store;

pub use action::{Action, ActionKind};
pub use actions::{
    ActionCreators, ActionError, ConsoleActions, LoginOutcome, PlatformManagerActions,
};
pub use dispatcher::{Dispatcher, StoreEvent};
pub use store::{AppState, ChangeSet, StoreId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Application error code the server uses for a missing or stale token.
    pub unauthorized_code: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unauthorized_code: UNAUTHORIZED_CODE,
        }
    }
}

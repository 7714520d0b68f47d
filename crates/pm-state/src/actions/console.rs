use super::ActionError;
use crate::action::Action;
use crate::dispatcher::Dispatcher;
use pm_client::RpcClient;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ConsoleActions {
    rpc: RpcClient,
    dispatcher: Dispatcher,
}

impl ConsoleActions {
    pub fn new(rpc: RpcClient, dispatcher: Dispatcher) -> Self {
        Self { rpc, dispatcher }
    }

    pub fn toggle_console(&self) {
        self.dispatcher.dispatch(Action::ToggleConsole);
    }

    pub fn update_composer_value(&self, value: impl Into<String>) {
        self.dispatcher.dispatch(Action::UpdateComposerValue {
            value: value.into(),
        });
    }

    /// Fires `raw` at the endpoint on its own task. The exchange log is the
    /// only place the outcome shows up.
    pub fn send_request(&self, raw: Value) -> JoinHandle<()> {
        let rpc = self.rpc.clone();
        tokio::spawn(async move {
            match rpc.call_raw(raw).await {
                Ok(_) => debug!(event = "console_request_settled"),
                Err(err) => debug!(event = "console_request_failed", error = %err),
            }
        })
    }

    /// Sends the composer text. Nothing goes out when it does not parse.
    pub fn send_composer(&self) -> Result<JoinHandle<()>, ActionError> {
        let composer = self
            .dispatcher
            .read(|state| state.console().composer_value().to_string());
        let raw: Value = serde_json::from_str(&composer).map_err(|err| {
            warn!(event = "console_composer_invalid", error = %err);
            ActionError::InvalidComposer(err.to_string())
        })?;
        Ok(self.send_request(raw))
    }
}

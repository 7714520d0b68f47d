use super::ActionError;
use crate::action::Action;
use crate::dispatcher::Dispatcher;
use crate::store::page_from_fragment;
use crate::Settings;
use futures_util::future::join_all;
use pm_client::{RpcClient, RpcError};
use pm_core::jsonrpc::RpcErrorObject;
use pm_core::methods::{ControlAgent, GetAuthorization, ListAgents, ListPlatforms, StatusAgents};
use pm_core::{AgentAction, ProcessStatus};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authorized,
    Unauthorized(RpcErrorObject),
}

#[derive(Debug, Clone)]
pub struct PlatformManagerActions {
    rpc: RpcClient,
    dispatcher: Dispatcher,
    settings: Settings,
}

impl PlatformManagerActions {
    pub fn new(rpc: RpcClient, dispatcher: Dispatcher, settings: Settings) -> Self {
        Self {
            rpc,
            dispatcher,
            settings,
        }
    }

    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, ActionError> {
        let method = GetAuthorization {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.rpc.invoke(&method, None).await {
            Ok(authorization) => {
                info!(event = "login_succeeded", username = %username);
                self.dispatcher
                    .dispatch(Action::ReceiveAuthorization { authorization });
                Ok(LoginOutcome::Authorized)
            }
            Err(err) => match self.report_unauthorized(&err, None) {
                Some(error) => {
                    info!(event = "login_rejected", username = %username, error = %error);
                    Ok(LoginOutcome::Unauthorized(error))
                }
                None => Err(err.into()),
            },
        }
    }

    pub fn clear_authorization(&self) {
        self.dispatcher.dispatch(Action::ClearAuthorization);
    }

    pub fn navigate(&self, page: impl Into<String>) {
        self.dispatcher
            .dispatch(Action::ChangePage { page: page.into() });
    }

    /// Entry point for a fragment change that did not come from `navigate`.
    pub fn navigate_to_fragment(&self, fragment: &str) {
        self.navigate(page_from_fragment(fragment));
    }

    /// Lists platforms, then each platform's agents and their statuses
    /// concurrently. Every reply is dispatched as soon as it lands. Returns
    /// the first failure after all branches have finished.
    pub async fn load_platforms(&self) -> Result<(), ActionError> {
        let authorization = self.dispatcher.authorization();
        let platforms = match self
            .rpc
            .invoke(&ListPlatforms, authorization.as_deref())
            .await
        {
            Ok(platforms) => platforms,
            Err(err) => return Err(self.classify(err, authorization)),
        };

        let uuids: Vec<String> = platforms.iter().map(|p| p.uuid.clone()).collect();
        self.dispatcher.dispatch(Action::ReceivePlatforms { platforms });

        let branches = uuids
            .iter()
            .map(|uuid| self.load_platform(uuid, authorization.clone()));
        let mut first_failure = None;
        for (uuid, result) in uuids.iter().zip(join_all(branches).await) {
            if let Err(err) = result {
                warn!(event = "platform_load_failed", platform_uuid = %uuid, error = %err);
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn load_platform(
        &self,
        platform_uuid: &str,
        authorization: Option<String>,
    ) -> Result<(), ActionError> {
        let agents = self
            .rpc
            .invoke(
                &ListAgents {
                    platform_uuid: platform_uuid.to_string(),
                },
                authorization.as_deref(),
            )
            .await
            .map_err(|err| self.classify(err, authorization.clone()))?;
        let empty = agents.is_empty();
        self.dispatcher.dispatch(Action::ReceivePlatformAgents {
            platform_uuid: platform_uuid.to_string(),
            agents,
        });
        if empty {
            return Ok(());
        }

        let generation = self.dispatcher.next_generation();
        let statuses = self
            .rpc
            .invoke(
                &StatusAgents {
                    platform_uuid: platform_uuid.to_string(),
                },
                authorization.as_deref(),
            )
            .await
            .map_err(|err| self.classify(err, authorization.clone()))?;
        self.dispatcher.dispatch(Action::ReceiveAgentStatuses {
            platform_uuid: platform_uuid.to_string(),
            statuses,
            generation,
        });
        Ok(())
    }

    pub async fn start_agent(
        &self,
        platform_uuid: &str,
        agent_uuid: &str,
    ) -> Result<Option<ProcessStatus>, ActionError> {
        self.control_agent(platform_uuid, agent_uuid, AgentAction::Start)
            .await
    }

    pub async fn stop_agent(
        &self,
        platform_uuid: &str,
        agent_uuid: &str,
    ) -> Result<Option<ProcessStatus>, ActionError> {
        self.control_agent(platform_uuid, agent_uuid, AgentAction::Stop)
            .await
    }

    /// Marks the agent pending, issues the call and settles the agent with
    /// whatever came back. Settlement happens on failure too.
    async fn control_agent(
        &self,
        platform_uuid: &str,
        agent_uuid: &str,
        action: AgentAction,
    ) -> Result<Option<ProcessStatus>, ActionError> {
        let known = self.dispatcher.read(|state| {
            state
                .platforms()
                .agent(platform_uuid, agent_uuid)
                .is_some()
        });
        if !known {
            return Err(ActionError::UnknownAgent {
                platform_uuid: platform_uuid.to_string(),
                agent_uuid: agent_uuid.to_string(),
            });
        }

        let authorization = self.dispatcher.authorization();
        let generation = self.dispatcher.next_generation();
        self.dispatcher.dispatch(Action::AgentActionPending {
            platform_uuid: platform_uuid.to_string(),
            agent_uuid: agent_uuid.to_string(),
            action,
            generation,
        });

        let result = self
            .rpc
            .invoke(
                &ControlAgent {
                    platform_uuid: platform_uuid.to_string(),
                    agent_uuid: agent_uuid.to_string(),
                    action,
                },
                authorization.as_deref(),
            )
            .await;

        self.dispatcher.dispatch(Action::AgentActionSettled {
            platform_uuid: platform_uuid.to_string(),
            agent_uuid: agent_uuid.to_string(),
            generation,
            status: result.as_ref().ok().copied().flatten(),
        });

        result.map_err(|err| {
            warn!(
                event = "agent_action_failed",
                platform_uuid = %platform_uuid,
                agent_uuid = %agent_uuid,
                action = action.as_str(),
                error = %err
            );
            self.classify(err, authorization)
        })
    }

    fn classify(&self, err: RpcError, authorization: Option<String>) -> ActionError {
        match self.report_unauthorized(&err, authorization) {
            Some(error) => ActionError::Unauthorized(error),
            None => ActionError::Rpc(err),
        }
    }

    /// Dispatches `ReceiveUnauthorized` for a not-authorized application
    /// error. The stores decide whether the token it carries is still live.
    fn report_unauthorized(
        &self,
        err: &RpcError,
        authorization: Option<String>,
    ) -> Option<RpcErrorObject> {
        if !err.is_unauthorized(self.settings.unauthorized_code) {
            return None;
        }
        let error = err.application()?.clone();
        self.dispatcher.dispatch(Action::ReceiveUnauthorized {
            error: error.clone(),
            authorization,
        });
        Some(error)
    }
}

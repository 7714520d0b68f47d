use pm_client::{Exchange, ExchangeOutcome};
use pm_core::jsonrpc::RpcErrorObject;
use pm_core::{AgentAction, AgentStatusEntry, AgentSummary, PlatformSummary, ProcessStatus};

/// Every state transition the stores understand. Action creators and the
/// exchange listener build these; only [`crate::AppState::apply`] consumes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    MakeRequest(Exchange),
    ReceiveResponse(Exchange),
    FailRequest(Exchange),
    ReceiveAuthorization {
        authorization: String,
    },
    /// `authorization` is the token the failed exchange was issued with, or
    /// `None` for a login attempt.
    ReceiveUnauthorized {
        error: RpcErrorObject,
        authorization: Option<String>,
    },
    ClearAuthorization,
    ChangePage {
        page: String,
    },
    ReceivePlatforms {
        platforms: Vec<PlatformSummary>,
    },
    ReceivePlatformAgents {
        platform_uuid: String,
        agents: Vec<AgentSummary>,
    },
    ReceiveAgentStatuses {
        platform_uuid: String,
        statuses: Vec<AgentStatusEntry>,
        generation: u64,
    },
    AgentActionPending {
        platform_uuid: String,
        agent_uuid: String,
        action: AgentAction,
        generation: u64,
    },
    AgentActionSettled {
        platform_uuid: String,
        agent_uuid: String,
        generation: u64,
        status: Option<ProcessStatus>,
    },
    ToggleConsole,
    UpdateComposerValue {
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    MakeRequest,
    ReceiveResponse,
    FailRequest,
    ReceiveAuthorization,
    ReceiveUnauthorized,
    ClearAuthorization,
    ChangePage,
    ReceivePlatforms,
    ReceivePlatformAgents,
    ReceiveAgentStatuses,
    AgentActionPending,
    AgentActionSettled,
    ToggleConsole,
    UpdateComposerValue,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::MakeRequest => "make_request",
            ActionKind::ReceiveResponse => "receive_response",
            ActionKind::FailRequest => "fail_request",
            ActionKind::ReceiveAuthorization => "receive_authorization",
            ActionKind::ReceiveUnauthorized => "receive_unauthorized",
            ActionKind::ClearAuthorization => "clear_authorization",
            ActionKind::ChangePage => "change_page",
            ActionKind::ReceivePlatforms => "receive_platforms",
            ActionKind::ReceivePlatformAgents => "receive_platform_agents",
            ActionKind::ReceiveAgentStatuses => "receive_agent_statuses",
            ActionKind::AgentActionPending => "agent_action_pending",
            ActionKind::AgentActionSettled => "agent_action_settled",
            ActionKind::ToggleConsole => "toggle_console",
            ActionKind::UpdateComposerValue => "update_composer_value",
        }
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::MakeRequest(_) => ActionKind::MakeRequest,
            Action::ReceiveResponse(_) => ActionKind::ReceiveResponse,
            Action::FailRequest(_) => ActionKind::FailRequest,
            Action::ReceiveAuthorization { .. } => ActionKind::ReceiveAuthorization,
            Action::ReceiveUnauthorized { .. } => ActionKind::ReceiveUnauthorized,
            Action::ClearAuthorization => ActionKind::ClearAuthorization,
            Action::ChangePage { .. } => ActionKind::ChangePage,
            Action::ReceivePlatforms { .. } => ActionKind::ReceivePlatforms,
            Action::ReceivePlatformAgents { .. } => ActionKind::ReceivePlatformAgents,
            Action::ReceiveAgentStatuses { .. } => ActionKind::ReceiveAgentStatuses,
            Action::AgentActionPending { .. } => ActionKind::AgentActionPending,
            Action::AgentActionSettled { .. } => ActionKind::AgentActionSettled,
            Action::ToggleConsole => ActionKind::ToggleConsole,
            Action::UpdateComposerValue { .. } => ActionKind::UpdateComposerValue,
        }
    }

    /// Maps a settled exchange to the notification the console log expects.
    /// Anything that got a JSON-RPC body back is a response; the rest failed.
    pub fn settled(exchange: Exchange) -> Self {
        if matches!(
            exchange.outcome,
            ExchangeOutcome::TransportError(_) | ExchangeOutcome::ProtocolError(_)
        ) {
            Action::FailRequest(exchange)
        } else {
            Action::ReceiveResponse(exchange)
        }
    }
}

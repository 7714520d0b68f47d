use crate::action::Action;
use pm_core::{AgentDisplayState, AgentStatusEntry, AgentSummary, PlatformSummary, ProcessStatus};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// One agent row plus the bookkeeping that keeps late replies from
/// overwriting newer ones.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub summary: AgentSummary,
    /// `None` until the first status for this agent has been applied.
    pub action_pending: Option<bool>,
    pub status: ProcessStatus,
    applied_generation: u64,
    outstanding: BTreeSet<u64>,
}

impl AgentRecord {
    fn new(summary: AgentSummary) -> Self {
        Self {
            summary,
            action_pending: None,
            status: ProcessStatus::NEVER_STARTED,
            applied_generation: 0,
            outstanding: BTreeSet::new(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.summary.uuid
    }

    pub fn name(&self) -> &str {
        &self.summary.name
    }

    pub fn display_state(&self) -> AgentDisplayState {
        AgentDisplayState::derive(self.action_pending, self.status)
    }

    /// Start/stop requests issued for this agent that have not settled yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    fn refresh_pending(&mut self) {
        self.action_pending = Some(!self.outstanding.is_empty());
    }

    fn apply_status(&mut self, generation: u64, status: ProcessStatus) {
        if generation <= self.applied_generation {
            return;
        }
        self.applied_generation = generation;
        self.status = status;
        self.refresh_pending();
    }

    fn begin(&mut self, generation: u64) {
        self.outstanding.insert(generation);
        self.action_pending = Some(true);
    }

    fn settle(&mut self, generation: u64, status: Option<ProcessStatus>) {
        if !self.outstanding.remove(&generation) {
            return;
        }
        if let Some(status) = status {
            if generation > self.applied_generation {
                self.applied_generation = generation;
                self.status = status;
            }
        }
        self.refresh_pending();
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BufferedStatuses {
    generation: u64,
    statuses: Vec<AgentStatusEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct PlatformDetail {
    agents: Option<Vec<AgentRecord>>,
    /// Statuses that arrived before the agent list did.
    buffered: Option<BufferedStatuses>,
}

impl PlatformDetail {
    fn replace_agents(&mut self, agents: &[AgentSummary]) {
        let previous = self.agents.take().unwrap_or_default();
        let mut next: Vec<AgentRecord> = agents
            .iter()
            .map(|summary| match previous.iter().find(|r| r.uuid() == summary.uuid) {
                Some(existing) => AgentRecord {
                    summary: summary.clone(),
                    ..existing.clone()
                },
                None => AgentRecord::new(summary.clone()),
            })
            .collect();
        if let Some(buffered) = self.buffered.take() {
            apply_statuses(&mut next, buffered.generation, &buffered.statuses);
        }
        self.agents = Some(next);
    }

    fn receive_statuses(&mut self, generation: u64, statuses: &[AgentStatusEntry]) {
        match self.agents.as_mut() {
            Some(agents) => apply_statuses(agents, generation, statuses),
            None => {
                let newer = self
                    .buffered
                    .as_ref()
                    .map(|buffered| generation > buffered.generation)
                    .unwrap_or(true);
                if newer {
                    self.buffered = Some(BufferedStatuses {
                        generation,
                        statuses: statuses.to_vec(),
                    });
                }
            }
        }
    }

    fn agent_mut(&mut self, agent_uuid: &str) -> Option<&mut AgentRecord> {
        self.agents
            .as_mut()
            .and_then(|agents| agents.iter_mut().find(|agent| agent.uuid() == agent_uuid))
    }
}

/// Agents missing from a status reply have never been started.
fn apply_statuses(agents: &mut [AgentRecord], generation: u64, statuses: &[AgentStatusEntry]) {
    for agent in agents.iter_mut() {
        let status = statuses
            .iter()
            .find(|entry| entry.uuid == agent.summary.uuid)
            .map(|entry| entry.status)
            .unwrap_or(ProcessStatus::NEVER_STARTED);
        agent.apply_status(generation, status);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlatformView<'a> {
    pub summary: &'a PlatformSummary,
    /// `None` until the platform's agent list has arrived.
    pub agents: Option<&'a [AgentRecord]>,
}

impl<'a> PlatformView<'a> {
    pub fn uuid(&self) -> &'a str {
        &self.summary.uuid
    }

    pub fn name(&self) -> &'a str {
        &self.summary.name
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformStore {
    listed: Option<Vec<PlatformSummary>>,
    details: HashMap<String, PlatformDetail>,
}

impl PlatformStore {
    pub fn platforms(&self) -> Option<Vec<PlatformView<'_>>> {
        self.listed
            .as_ref()
            .map(|listed| listed.iter().map(|summary| self.view(summary)).collect())
    }

    pub fn platform(&self, platform_uuid: &str) -> Option<PlatformView<'_>> {
        self.listed
            .as_ref()?
            .iter()
            .find(|summary| summary.uuid == platform_uuid)
            .map(|summary| self.view(summary))
    }

    pub fn agent(&self, platform_uuid: &str, agent_uuid: &str) -> Option<&AgentRecord> {
        self.platform(platform_uuid)?
            .agents?
            .iter()
            .find(|agent| agent.uuid() == agent_uuid)
    }

    fn view<'a>(&'a self, summary: &'a PlatformSummary) -> PlatformView<'a> {
        PlatformView {
            summary,
            agents: self
                .details
                .get(&summary.uuid)
                .and_then(|detail| detail.agents.as_deref()),
        }
    }

    fn is_listed(&self, platform_uuid: &str) -> bool {
        match self.listed.as_ref() {
            Some(listed) => listed.iter().any(|summary| summary.uuid == platform_uuid),
            None => true,
        }
    }

    /// Detail for a platform the store may hold. Before the first platform
    /// list arrives every uuid qualifies.
    fn detail_mut(&mut self, platform_uuid: &str) -> Option<&mut PlatformDetail> {
        if !self.is_listed(platform_uuid) {
            debug!(
                event = "platform_update_dropped",
                platform_uuid = %platform_uuid,
                reason = "not_listed"
            );
            return None;
        }
        Some(self.details.entry(platform_uuid.to_string()).or_default())
    }

    pub(crate) fn apply(&mut self, action: &Action) -> bool {
        if !Self::handles(action) {
            return false;
        }
        let before = self.clone();
        match action {
            Action::ReceivePlatforms { platforms } => {
                self.details
                    .retain(|uuid, _| platforms.iter().any(|summary| summary.uuid == *uuid));
                self.listed = Some(platforms.clone());
            }
            Action::ReceivePlatformAgents {
                platform_uuid,
                agents,
            } => {
                if let Some(detail) = self.detail_mut(platform_uuid) {
                    detail.replace_agents(agents);
                }
            }
            Action::ReceiveAgentStatuses {
                platform_uuid,
                statuses,
                generation,
            } => {
                if let Some(detail) = self.detail_mut(platform_uuid) {
                    detail.receive_statuses(*generation, statuses);
                }
            }
            Action::AgentActionPending {
                platform_uuid,
                agent_uuid,
                generation,
                ..
            } => {
                if let Some(agent) = self
                    .details
                    .get_mut(platform_uuid)
                    .and_then(|detail| detail.agent_mut(agent_uuid))
                {
                    agent.begin(*generation);
                }
            }
            Action::AgentActionSettled {
                platform_uuid,
                agent_uuid,
                generation,
                status,
            } => {
                if let Some(agent) = self
                    .details
                    .get_mut(platform_uuid)
                    .and_then(|detail| detail.agent_mut(agent_uuid))
                {
                    agent.settle(*generation, *status);
                }
            }
            _ => return false,
        }
        *self != before
    }

    fn handles(action: &Action) -> bool {
        matches!(
            action,
            Action::ReceivePlatforms { .. }
                | Action::ReceivePlatformAgents { .. }
                | Action::ReceiveAgentStatuses { .. }
                | Action::AgentActionPending { .. }
                | Action::AgentActionSettled { .. }
        )
    }
}

//! Agent lifecycle events and the sink they are published to

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use boss_core::work_item::WorkItemId;

use crate::pool::{Agent, AgentId};

/// Lifecycle notification produced by the agent pool
///
/// Serializes to the bare payload; the wire name comes from [`AgentEvent::name`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentEvent {
    /// An agent was registered
    Created(Agent),

    /// An agent picked up a work item and its process is running
    #[serde(rename_all = "camelCase")]
    Started {
        agent_id: AgentId,
        work_item_id: WorkItemId,
    },

    /// An agent's process is gone and the agent is idle again
    #[serde(rename_all = "camelCase")]
    Stopped { agent_id: AgentId },

    /// An agent's process exited on its own with an abnormal status
    #[serde(rename_all = "camelCase")]
    Errored {
        agent_id: AgentId,
        exit_code: Option<i32>,
    },
}

impl AgentEvent {
    /// Event name used on the live-update channel
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "agent:created",
            Self::Started { .. } => "agent:started",
            Self::Stopped { .. } => "agent:stopped",
            Self::Errored { .. } => "agent:error",
        }
    }

    pub fn agent_id(&self) -> AgentId {
        match self {
            Self::Created(agent) => agent.id,
            Self::Started { agent_id, .. }
            | Self::Stopped { agent_id }
            | Self::Errored { agent_id, .. } => *agent_id,
        }
    }
}

/// Fire-and-forget sink for agent events
///
/// Implementations must not block and must not fail the caller; delivery is
/// best effort.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: AgentEvent);
}

/// Fans events out to any number of in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<AgentEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: AgentEvent) {
        // No subscribers is not an error
        if self.tx.send(event).is_err() {
            trace!("Dropped agent event with no subscribers");
        }
    }
}

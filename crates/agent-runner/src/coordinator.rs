//! Assignment coordinator - hands pending work items to agents

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use boss_core::work_item::{WorkItem, WorkItemId, WorkItemRepository, WorkItemStatus};

use crate::error::{OrchestratorError, Result};
use crate::pool::{Agent, AgentId, AgentPool};

/// Outcome of a successful assignment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub work_item: WorkItem,
    pub agent: Agent,
}

/// Drives work item status together with agent assignment
pub struct AssignmentCoordinator {
    store: Arc<dyn WorkItemRepository>,
    pool: AgentPool,
    /// Serializes work item transitions so one item never reaches two agents
    transitions: Mutex<()>,
}

impl AssignmentCoordinator {
    pub fn new(store: Arc<dyn WorkItemRepository>, pool: AgentPool) -> Self {
        Self {
            store,
            pool,
            transitions: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    pub fn store(&self) -> &Arc<dyn WorkItemRepository> {
        &self.store
    }

    async fn load(&self, work_item_id: WorkItemId) -> Result<WorkItem> {
        self.store
            .get(work_item_id)
            .await?
            .ok_or(OrchestratorError::WorkItemNotFound { work_item_id })
    }

    /// Assign a pending work item to a specific agent
    pub async fn assign(&self, work_item_id: WorkItemId, agent_id: AgentId) -> Result<Assignment> {
        let guard = self.transitions.lock().await;
        self.assign_locked(guard, work_item_id, agent_id).await
    }

    /// Assign a pending work item to the first idle agent
    pub async fn assign_next(&self, work_item_id: WorkItemId) -> Result<Assignment> {
        let guard = self.transitions.lock().await;
        let agent = self
            .pool
            .find_available()
            .await
            .ok_or(OrchestratorError::NoAgentAvailable)?;
        self.assign_locked(guard, work_item_id, agent.id).await
    }

    async fn assign_locked(
        &self,
        guard: MutexGuard<'_, ()>,
        work_item_id: WorkItemId,
        agent_id: AgentId,
    ) -> Result<Assignment> {
        let work_item = self.load(work_item_id).await?;
        if !work_item.status.is_assignable() {
            return Err(OrchestratorError::InvalidState {
                work_item_id,
                status: work_item.status,
                expected: WorkItemStatus::Pending,
            });
        }

        let agent = self.pool.start_work_item(agent_id, &work_item).await?;

        let work_item = match self
            .store
            .set_status(work_item_id, WorkItemStatus::InProgress)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                // Undo the agent half so neither side is left updated alone
                warn!(
                    "Failed to mark work item {} in progress, stopping agent {}: {}",
                    work_item_id, agent_id, e
                );
                // The item is still pending; waiting out the agent's grace
                // period must not hold up other transitions
                drop(guard);
                if let Err(stop_err) = self.pool.stop(agent_id).await {
                    warn!("Rollback stop of agent {} failed: {}", agent_id, stop_err);
                }
                return Err(e.into());
            }
        };

        info!("Assigned work item {} to agent {}", work_item_id, agent_id);
        Ok(Assignment { work_item, agent })
    }

    /// Mark an in-progress work item completed
    ///
    /// The agent is left as is; freeing it is a separate stop.
    pub async fn complete(&self, work_item_id: WorkItemId) -> Result<WorkItem> {
        let item = self.finish(work_item_id, WorkItemStatus::Completed).await?;
        info!("Completed work item {}", work_item_id);
        Ok(item)
    }

    /// Mark an in-progress work item failed
    pub async fn fail(&self, work_item_id: WorkItemId) -> Result<WorkItem> {
        let item = self.finish(work_item_id, WorkItemStatus::Failed).await?;
        info!("Failed work item {}", work_item_id);
        Ok(item)
    }

    /// Edit a work item's descriptive fields without racing status changes
    pub async fn edit(
        &self,
        work_item_id: WorkItemId,
        apply: impl FnOnce(&mut WorkItem) + Send,
    ) -> Result<WorkItem> {
        let _guard = self.transitions.lock().await;
        let mut work_item = self.load(work_item_id).await?;
        let status = work_item.status;
        apply(&mut work_item);
        work_item.status = status;
        Ok(self.store.update(work_item).await?)
    }

    async fn finish(&self, work_item_id: WorkItemId, target: WorkItemStatus) -> Result<WorkItem> {
        let _guard = self.transitions.lock().await;
        let work_item = self.load(work_item_id).await?;
        if !work_item.status.can_transition_to(target) {
            return Err(OrchestratorError::InvalidState {
                work_item_id,
                status: work_item.status,
                expected: WorkItemStatus::InProgress,
            });
        }
        Ok(self.store.set_status(work_item_id, target).await?)
    }
}

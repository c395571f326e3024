//! Agent pool - registry of logical agents and the processes behind them

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use boss_core::work_item::{WorkItem, WorkItemId};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::event::{AgentEvent, EventPublisher};
use crate::process::{
    OutputStream, ProcessExit, ProcessHandle, ProcessId, ProcessObserver, ProcessSupervisor,
    SpawnRequest,
};
use crate::workspace::{render_instructions, WorkspaceProvisioner};

/// Numeric agent identifier, allocated from 1 in registration order
pub type AgentId = u64;

/// Availability of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    /// Last process exited abnormally; cleared by an explicit stop
    Error,
}

/// Point-in-time view of an agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_item_id: Option<WorkItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Whether a live process handle backs the agent
    #[serde(skip)]
    pub process_attached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }
}

/// Mutable part of an agent, only touched with its lock held
#[derive(Debug)]
struct AgentSlot {
    status: AgentStatus,
    work_item_id: Option<WorkItemId>,
    process: Option<ProcessHandle>,
    started_at: Option<DateTime<Utc>>,
    stop_requested: bool,
}

impl AgentSlot {
    fn idle() -> Self {
        Self {
            status: AgentStatus::Idle,
            work_item_id: None,
            process: None,
            started_at: None,
            stop_requested: false,
        }
    }

    fn process_id(&self) -> Option<ProcessId> {
        self.process.as_ref().map(ProcessHandle::id)
    }

    fn release(&mut self, status: AgentStatus) {
        self.status = status;
        self.work_item_id = None;
        self.process = None;
        self.started_at = None;
        self.stop_requested = false;
    }
}

#[derive(Debug)]
struct AgentEntry {
    id: AgentId,
    name: String,
    slot: Mutex<AgentSlot>,
}

impl AgentEntry {
    fn snapshot(&self, slot: &AgentSlot) -> Agent {
        Agent {
            id: self.id,
            name: self.name.clone(),
            status: slot.status,
            work_item_id: slot.work_item_id,
            pid: slot.process.as_ref().and_then(ProcessHandle::pid),
            process_attached: slot.process.is_some(),
            started_at: slot.started_at,
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: AgentId,
    /// Registration order
    agents: Vec<Arc<AgentEntry>>,
    by_id: HashMap<AgentId, Arc<AgentEntry>>,
}

struct PoolInner {
    registry: RwLock<Registry>,
    supervisor: ProcessSupervisor,
    workspaces: WorkspaceProvisioner,
    agent_command: String,
    agent_args: Vec<String>,
    publisher: Arc<dyn EventPublisher>,
}

impl PoolInner {
    async fn lookup(&self, agent_id: AgentId) -> Option<Arc<AgentEntry>> {
        self.registry.read().await.by_id.get(&agent_id).cloned()
    }

    /// Exit callback from the supervisor for a process this pool spawned
    async fn handle_exit(&self, agent_id: AgentId, exit: ProcessExit) {
        let Some(entry) = self.lookup(agent_id).await else {
            warn!("Exit reported for unknown agent {}", agent_id);
            return;
        };

        let mut slot = entry.slot.lock().await;
        if slot.process_id() != Some(exit.process_id) {
            debug!("Ignoring stale exit of {:?} for agent {}", exit.process_id, agent_id);
            return;
        }

        if exit.is_abnormal() && !slot.stop_requested {
            warn!(
                "Agent {} process exited abnormally with code {:?}",
                agent_id, exit.code
            );
            slot.release(AgentStatus::Error);
            self.publisher.publish(AgentEvent::Errored {
                agent_id,
                exit_code: exit.code,
            });
        } else {
            info!(
                "Agent {} process exited with code {:?} ({:?})",
                agent_id, exit.code, exit.termination
            );
            slot.release(AgentStatus::Idle);
            self.publisher.publish(AgentEvent::Stopped { agent_id });
        }
    }
}

/// Routes one process's callbacks back to the agent it backs
struct AgentProcessObserver {
    agent_id: AgentId,
    pool: Weak<PoolInner>,
}

#[async_trait]
impl ProcessObserver for AgentProcessObserver {
    fn on_output(&self, stream: OutputStream, line: &str) {
        debug!("[agent {}] {:?}: {}", self.agent_id, stream, line);
    }

    async fn on_exit(&self, exit: ProcessExit) {
        match self.pool.upgrade() {
            Some(pool) => pool.handle_exit(self.agent_id, exit).await,
            None => debug!("Pool dropped before agent {} exited", self.agent_id),
        }
    }
}

/// Registry of agents; the only place agent state is mutated
///
/// Each agent has its own lock, so transitions for one agent are totally
/// ordered while different agents proceed independently.
#[derive(Clone)]
pub struct AgentPool {
    inner: Arc<PoolInner>,
}

impl AgentPool {
    pub fn new(config: &OrchestratorConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                registry: RwLock::new(Registry {
                    next_id: 1,
                    ..Default::default()
                }),
                supervisor: ProcessSupervisor::from_config(config),
                workspaces: WorkspaceProvisioner::new(&config.workspace_root),
                agent_command: config.agent_command.clone(),
                agent_args: config.agent_args.clone(),
                publisher,
            }),
        }
    }

    pub fn workspaces(&self) -> &WorkspaceProvisioner {
        &self.inner.workspaces
    }

    async fn entry(&self, agent_id: AgentId) -> Result<Arc<AgentEntry>> {
        self.inner
            .lookup(agent_id)
            .await
            .ok_or(OrchestratorError::AgentNotFound { agent_id })
    }

    /// Register a new idle agent
    pub async fn register(&self, name: impl Into<String>) -> Agent {
        let mut registry = self.inner.registry.write().await;
        let id = registry.next_id;
        registry.next_id += 1;

        let entry = Arc::new(AgentEntry {
            id,
            name: name.into(),
            slot: Mutex::new(AgentSlot::idle()),
        });
        registry.agents.push(Arc::clone(&entry));
        registry.by_id.insert(id, Arc::clone(&entry));

        let agent = entry.snapshot(&AgentSlot::idle());
        info!("Created agent: {} (ID: {})", agent.name, id);
        self.inner.publisher.publish(AgentEvent::Created(agent.clone()));
        agent
    }

    /// Start `agent_id` on a work item known only by id
    pub async fn start(&self, agent_id: AgentId, work_item_id: WorkItemId) -> Result<Agent> {
        self.start_assignment(agent_id, work_item_id, None).await
    }

    /// Start `agent_id` on a loaded work item, whose details go into the
    /// instructions
    pub async fn start_work_item(&self, agent_id: AgentId, work_item: &WorkItem) -> Result<Agent> {
        self.start_assignment(agent_id, work_item.id, Some(work_item))
            .await
    }

    async fn start_assignment(
        &self,
        agent_id: AgentId,
        work_item_id: WorkItemId,
        work_item: Option<&WorkItem>,
    ) -> Result<Agent> {
        let entry = self.entry(agent_id).await?;

        // Held across workspace preparation and spawn: nobody observes a
        // half-started agent, and a racing start sees Busy.
        let mut slot = entry.slot.lock().await;
        if slot.status != AgentStatus::Idle {
            return Err(OrchestratorError::AlreadyBusy { agent_id });
        }

        let workspace = self.inner.workspaces.workspace_for(agent_id, work_item_id);
        let instructions = render_instructions(agent_id, &entry.name, work_item_id, work_item);
        self.inner.workspaces.prepare(&workspace, &instructions).await?;

        let request = SpawnRequest {
            working_dir: workspace,
            command: self.inner.agent_command.clone(),
            args: self.inner.agent_args.clone(),
            env: vec![
                ("AGENT_ID".to_string(), agent_id.to_string()),
                ("WORK_ITEM_ID".to_string(), work_item_id.to_string()),
            ],
        };
        let observer = Arc::new(AgentProcessObserver {
            agent_id,
            pool: Arc::downgrade(&self.inner),
        });
        let handle = self.inner.supervisor.spawn(request, observer)?;

        slot.status = AgentStatus::Busy;
        slot.work_item_id = Some(work_item_id);
        slot.process = Some(handle);
        slot.started_at = Some(Utc::now());
        slot.stop_requested = false;

        let agent = entry.snapshot(&slot);
        info!(
            "Started agent {} on work item {} (PID: {:?})",
            agent_id, work_item_id, agent.pid
        );
        self.inner.publisher.publish(AgentEvent::Started {
            agent_id,
            work_item_id,
        });
        Ok(agent)
    }

    /// Stop an agent, waiting for its process (if any) to exit
    ///
    /// Always leaves the agent idle. Stopping an idle agent is a no-op apart
    /// from the event.
    pub async fn stop(&self, agent_id: AgentId) -> Result<Agent> {
        let entry = self.entry(agent_id).await?;

        let (process_id, watcher) = {
            let mut slot = entry.slot.lock().await;
            match slot.process.as_ref() {
                Some(handle) => {
                    info!("Stopping agent {} (PID: {:?})", agent_id, handle.pid());
                    self.inner.supervisor.request_graceful_stop(handle);
                    let pending = (handle.id(), handle.exit_watcher());
                    slot.stop_requested = true;
                    pending
                }
                None => {
                    slot.release(AgentStatus::Idle);
                    info!("Stopped agent {}", agent_id);
                    self.inner
                        .publisher
                        .publish(AgentEvent::Stopped { agent_id });
                    return Ok(entry.snapshot(&slot));
                }
            }
        };

        // Lock released: the exit callback needs it to release the slot
        if watcher.wait().await.is_none() {
            warn!("Supervisor for agent {} vanished before reporting exit", agent_id);
        }

        let mut slot = entry.slot.lock().await;
        if slot.process_id() == Some(process_id) {
            slot.release(AgentStatus::Idle);
            self.inner
                .publisher
                .publish(AgentEvent::Stopped { agent_id });
        }
        info!("Stopped agent {}", agent_id);
        Ok(entry.snapshot(&slot))
    }

    /// Stop every agent that has a process attached
    pub async fn stop_all(&self) {
        let ids: Vec<AgentId> = self
            .list()
            .await
            .into_iter()
            .filter(|a| a.process_attached)
            .map(|a| a.id)
            .collect();

        let stops = ids.into_iter().map(|id| self.stop(id));
        for result in futures::future::join_all(stops).await {
            if let Err(e) = result {
                warn!("Failed to stop agent during shutdown: {}", e);
            }
        }
    }

    pub async fn get(&self, agent_id: AgentId) -> Option<Agent> {
        let entry = self.inner.lookup(agent_id).await?;
        let slot = entry.slot.lock().await;
        Some(entry.snapshot(&slot))
    }

    /// All agents in registration order
    pub async fn list(&self) -> Vec<Agent> {
        let entries = self.inner.registry.read().await.agents.clone();
        let mut agents = Vec::with_capacity(entries.len());
        for entry in entries {
            let slot = entry.slot.lock().await;
            agents.push(entry.snapshot(&slot));
        }
        agents
    }

    /// First idle agent in registration order
    pub async fn find_available(&self) -> Option<Agent> {
        let entries = self.inner.registry.read().await.agents.clone();
        for entry in entries {
            let slot = entry.slot.lock().await;
            if slot.status == AgentStatus::Idle {
                return Some(entry.snapshot(&slot));
            }
        }
        None
    }
}

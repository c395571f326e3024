//! Application state

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_runner::{AgentPool, AssignmentCoordinator, BroadcastPublisher, OrchestratorConfig};
use boss_core::work_item::FileWorkItemStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    data_dir: PathBuf,
    port: u16,
    config: OrchestratorConfig,
    work_items: Arc<FileWorkItemStore>,
    coordinator: AssignmentCoordinator,
    events: BroadcastPublisher,
}

impl AppState {
    /// Create a new AppState with the given data directory
    pub async fn new(
        data_dir: PathBuf,
        port: u16,
        config: OrchestratorConfig,
    ) -> boss_core::Result<Self> {
        let work_items = Arc::new(FileWorkItemStore::new(data_dir.join("work_items.json")).await?);
        let events = BroadcastPublisher::default();
        let pool = AgentPool::new(&config, Arc::new(events.clone()));
        let coordinator = AssignmentCoordinator::new(work_items.clone(), pool);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                data_dir,
                port,
                config,
                work_items,
                coordinator,
                events,
            }),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Get reference to the work item store
    pub fn work_items(&self) -> &FileWorkItemStore {
        &self.inner.work_items
    }

    pub fn coordinator(&self) -> &AssignmentCoordinator {
        &self.inner.coordinator
    }

    pub fn pool(&self) -> &AgentPool {
        self.inner.coordinator.pool()
    }

    /// Agent lifecycle events, for the live-update bridge
    pub fn events(&self) -> &BroadcastPublisher {
        &self.inner.events
    }
}

//! Agent Runner - orchestration of external agent processes
//!
//! This crate spawns one worker process per assignment in its own
//! workspace, supervises it through graceful-then-forced shutdown, and keeps
//! the registry of agents and their assignments consistent.

mod config;
mod coordinator;
mod error;
mod event;
mod pool;
mod process;
mod workspace;

pub use config::OrchestratorConfig;
pub use coordinator::{Assignment, AssignmentCoordinator};
pub use error::{ErrorKind, OrchestratorError, Result};
pub use event::{AgentEvent, BroadcastPublisher, EventPublisher};
pub use pool::{Agent, AgentId, AgentPool, AgentStatus};
pub use process::{
    ExitWatcher, OutputStream, ProcessExit, ProcessHandle, ProcessId, ProcessObserver,
    ProcessState, ProcessSupervisor, SpawnRequest, Termination, EXIT_TOKEN,
};
pub use workspace::{render_instructions, WorkspaceProvisioner, INSTRUCTIONS_FILE};

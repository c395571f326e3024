//! Error types for agent-runner

use thiserror::Error;

use boss_core::work_item::{WorkItemId, WorkItemStatus};

use crate::pool::AgentId;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Coarse classification of orchestration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyBusy,
    InvalidState,
    Spawn,
    Io,
    Internal,
}

/// Errors that can occur while orchestrating agents
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No agent registered under this id
    #[error("Agent {agent_id} not found")]
    AgentNotFound { agent_id: AgentId },

    /// No work item stored under this id
    #[error("Work item {work_item_id} not found")]
    WorkItemNotFound { work_item_id: WorkItemId },

    /// Agent is not idle
    #[error("Agent {agent_id} is already busy")]
    AlreadyBusy { agent_id: AgentId },

    /// Every registered agent is busy (or none exist)
    #[error("No idle agent available")]
    NoAgentAvailable,

    /// Work item is not in the status the transition requires
    #[error("Work item {work_item_id} is {status}, expected {expected}")]
    InvalidState {
        work_item_id: WorkItemId,
        status: WorkItemStatus,
        expected: WorkItemStatus,
    },

    /// Failed to spawn agent process
    #[error("Failed to spawn agent process: {message}")]
    Spawn {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Workspace preparation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Work item storage failed
    #[error("Work item store error: {0}")]
    Store(#[source] boss_core::Error),

    /// A configuration value could not be parsed
    #[error("Invalid configuration for {key}: {message}")]
    InvalidConfig { key: String, message: String },
}

impl OrchestratorError {
    /// Create a Spawn error
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::Spawn {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Spawn error with source
    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AgentNotFound { .. } | Self::WorkItemNotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyBusy { .. } | Self::NoAgentAvailable => ErrorKind::AlreadyBusy,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Spawn { .. } => ErrorKind::Spawn,
            Self::Io(_) => ErrorKind::Io,
            Self::Store(boss_core::Error::WorkItemNotFound(_)) => ErrorKind::NotFound,
            Self::Store(_) | Self::InvalidConfig { .. } => ErrorKind::Internal,
        }
    }
}

impl From<boss_core::Error> for OrchestratorError {
    fn from(err: boss_core::Error) -> Self {
        match err {
            boss_core::Error::WorkItemNotFound(work_item_id) => {
                Self::WorkItemNotFound { work_item_id }
            }
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            OrchestratorError::AgentNotFound { agent_id: 3 }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            OrchestratorError::AlreadyBusy { agent_id: 1 }.kind(),
            ErrorKind::AlreadyBusy
        );
        assert_eq!(
            OrchestratorError::spawn_failed("missing binary").kind(),
            ErrorKind::Spawn
        );
    }

    #[test]
    fn test_store_not_found_maps_to_work_item_not_found() {
        let err: OrchestratorError = boss_core::Error::WorkItemNotFound(9).into();
        assert!(matches!(
            err,
            OrchestratorError::WorkItemNotFound { work_item_id: 9 }
        ));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_invalid_state_message() {
        let err = OrchestratorError::InvalidState {
            work_item_id: 4,
            status: WorkItemStatus::Completed,
            expected: WorkItemStatus::Pending,
        };
        assert_eq!(err.to_string(), "Work item 4 is completed, expected pending");
    }
}

//! Work item model definitions

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric identifier of a work item, allocated by the store
pub type WorkItemId = u64;

/// Lifecycle status of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Default for WorkItemStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl WorkItemStatus {
    /// Completed and failed work items never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a work item in this status may be handed to an agent
    pub fn is_assignable(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Check whether moving from `self` to `next` follows the lifecycle
    ///
    /// pending -> in_progress -> (completed | failed)
    pub fn can_transition_to(&self, next: WorkItemStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work item priority level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemPriority {
    Low,
    Medium,
    High,
}

impl Default for WorkItemPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl WorkItemPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A unit of work tracked by the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub title: String,
    pub description: Option<String>,
    pub status: WorkItemStatus,
    pub priority: WorkItemPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by a caller when creating a work item
#[derive(Debug, Clone, Default)]
pub struct NewWorkItem {
    pub title: String,
    pub description: Option<String>,
    pub status: WorkItemStatus,
    pub priority: WorkItemPriority,
}

impl NewWorkItem {
    /// Create a pending work item with the given title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: WorkItemPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Materialize the work item under the id allocated by a store
    pub fn into_work_item(self, id: WorkItemId) -> WorkItem {
        let now = Utc::now();
        WorkItem {
            id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            created_at: now,
            updated_at: now,
        }
    }
}

//! Work item repository trait
//!
//! Defines the interface for work item storage operations.

use async_trait::async_trait;

use super::model::{NewWorkItem, WorkItem, WorkItemId, WorkItemStatus};
use crate::Result;

/// Repository interface for work item storage
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    /// Create a new work item, allocating its id
    async fn create(&self, item: NewWorkItem) -> Result<WorkItem>;

    /// Get a work item by ID
    async fn get(&self, id: WorkItemId) -> Result<Option<WorkItem>>;

    /// Get all work items, newest first
    async fn list(&self) -> Result<Vec<WorkItem>>;

    /// Update an existing work item
    async fn update(&self, item: WorkItem) -> Result<WorkItem>;

    /// Overwrite the status of a work item
    async fn set_status(&self, id: WorkItemId, status: WorkItemStatus) -> Result<WorkItem>;
}

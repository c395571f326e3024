//! Work item module
//!
//! This module contains work item types, the storage contract and the
//! file backed store.

mod file_store;
mod model;
mod repository;

pub use file_store::FileWorkItemStore;
pub use model::*;
pub use repository::WorkItemRepository;

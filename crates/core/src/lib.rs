//! Core library for Agent Boss
//!
//! This crate contains the work item model and its storage:
//! - Work item types and status lifecycle
//! - The repository contract the orchestrator depends on
//! - A JSON file backed store

pub mod error;
pub mod work_item;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

//! Route handlers

pub mod agents;
pub mod config;
pub mod health;
pub mod work_items;

//! Data access for the NQM tables.
//!
//! Each sub-module owns one concern of the ping-task flow. Public functions are
//! re-exported here so callers can use `crate::db::services::*`.

pub mod agent_service;
pub mod ping_task_service;
pub mod target_service;

pub use agent_service::*;
pub use ping_task_service::*;
pub use target_service::*;

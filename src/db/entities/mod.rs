//! SeaORM entities for the NQM tables.
//!
//! One module per table. The four `target_filter_*` tables share a shape:
//! `(agent_id, value)` keyed rows hanging off `nqm_ping_task`.

pub mod agent;
pub mod ping_task;
pub mod target;
pub mod target_filter_city;
pub mod target_filter_isp;
pub mod target_filter_name_tag;
pub mod target_filter_province;

pub mod prelude {
    pub use super::agent::Entity as Agent;
    pub use super::ping_task::Entity as PingTask;
    pub use super::target::Entity as Target;

    pub use super::target_filter_isp::Entity as TargetFilterIsp;
    pub use super::target_filter_province::Entity as TargetFilterProvince;
    pub use super::target_filter_city::Entity as TargetFilterCity;
    pub use super::target_filter_name_tag::Entity as TargetFilterNameTag;
}

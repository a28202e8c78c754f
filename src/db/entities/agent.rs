use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Bit of `status` that marks an agent as enabled.
pub const STATUS_ENABLED: i16 = 0b0000_0001;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nqm_agent")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub connection_id: String,
    pub hostname: String,
    pub ip_address: Vec<u8>,
    pub status: i16,
    pub isp_id: i16,
    pub province_id: i16,
    pub city_id: i16,
}

impl Model {
    pub fn is_enabled(&self) -> bool {
        self.status & STATUS_ENABLED == STATUS_ENABLED
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::ping_task::Entity")]
    PingTask,
}

impl Related<super::ping_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PingTask.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

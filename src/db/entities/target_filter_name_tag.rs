use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nqm_pt_target_filter_name_tag")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub agent_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub name_tag: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ping_task::Entity",
        from = "Column::AgentId",
        to = "super::ping_task::Column::AgentId",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    PingTask,
}

impl Related<super::ping_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PingTask.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

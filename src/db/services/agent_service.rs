use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use tracing::{debug, error};

use crate::db::entities::agent::{self, STATUS_ENABLED};
use crate::db::models::NewAgent;
use crate::error::Result;

/// Attribution id stored for agents that have not been placed yet.
pub const UNKNOWN_LOCATION_ID: i16 = -1;

/// Inserts a new agent or refreshes hostname and IP of an existing one.
///
/// Returns the agent's id. An existing agent keeps its id, status and attribution.
pub async fn upsert_agent<C>(db: &C, new_agent: &NewAgent) -> Result<i32>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let insert = agent::Entity::insert(agent::ActiveModel {
        connection_id: Set(new_agent.connection_id.clone()),
        hostname: Set(new_agent.hostname.clone()),
        ip_address: Set(new_agent.ip_address.clone()),
        status: Set(STATUS_ENABLED),
        isp_id: Set(UNKNOWN_LOCATION_ID),
        province_id: Set(UNKNOWN_LOCATION_ID),
        city_id: Set(UNKNOWN_LOCATION_ID),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(agent::Column::ConnectionId)
            .update_columns([agent::Column::Hostname, agent::Column::IpAddress])
            .to_owned(),
    );

    if let Err(e) = insert.exec_without_returning(&txn).await {
        error!(connection_id = %new_agent.connection_id, error = %e, "Cannot refresh agent");
        return Err(e.into());
    }

    // The id of an updated row is not reported by every backend, so read it back.
    let agent_id = agent::Entity::find()
        .select_only()
        .column(agent::Column::Id)
        .filter(agent::Column::ConnectionId.eq(new_agent.connection_id.as_str()))
        .into_tuple::<i32>()
        .one(&txn)
        .await?
        .ok_or_else(|| {
            DbErr::RecordNotFound(format!(
                "Agent {} vanished after upsert",
                new_agent.connection_id
            ))
        })?;

    txn.commit().await?;

    debug!(agent_id, connection_id = %new_agent.connection_id, "Refreshed agent");
    Ok(agent_id)
}

pub async fn find_agent_by_connection_id<C: ConnectionTrait>(
    db: &C,
    connection_id: &str,
) -> Result<Option<agent::Model>> {
    let agent = agent::Entity::find()
        .filter(agent::Column::ConnectionId.eq(connection_id))
        .one(db)
        .await?;
    Ok(agent)
}

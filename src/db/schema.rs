//! Table bootstrap built from the entity definitions.

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::debug;

use crate::db::entities::prelude::*;

/// Creates every NQM table that does not exist yet.
///
/// Tables are created parents first so foreign keys resolve on every backend.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Agent).await?;
    create_table(db, &schema, PingTask).await?;
    create_table(db, &schema, Target).await?;
    create_table(db, &schema, TargetFilterIsp).await?;
    create_table(db, &schema, TargetFilterProvince).await?;
    create_table(db, &schema, TargetFilterCity).await?;
    create_table(db, &schema, TargetFilterNameTag).await?;

    Ok(())
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(db.get_database_backend().build(&statement)).await?;
    debug!(table = entity.table_name(), "Ensured table exists");
    Ok(())
}

//! In-memory SQLite fixtures shared by the service tests.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

use crate::db::entities::{
    agent, ping_task, target, target_filter_city, target_filter_isp, target_filter_name_tag,
    target_filter_province,
};
use crate::db::schema::create_tables;

pub async fn setup_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    // Every pooled connection would otherwise open its own empty database.
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt)
        .await
        .expect("Failed to open in-memory database");
    create_tables(&db).await.expect("Failed to create tables");
    db
}

pub async fn insert_agent(
    db: &DatabaseConnection,
    connection_id: &str,
    status: i16,
) -> agent::Model {
    agent::ActiveModel {
        connection_id: Set(connection_id.to_string()),
        hostname: Set(format!("{connection_id}.example")),
        ip_address: Set(vec![10, 0, 0, 1]),
        status: Set(status),
        isp_id: Set(3),
        province_id: Set(7),
        city_id: Set(21),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert agent")
}

pub async fn insert_ping_task(
    db: &DatabaseConnection,
    agent_id: i32,
    period_minutes: i32,
    last_executed_at: Option<DateTime<Utc>>,
) {
    ping_task::ActiveModel {
        agent_id: Set(agent_id),
        period_minutes: Set(period_minutes),
        last_executed_at: Set(last_executed_at),
    }
    .insert(db)
    .await
    .expect("Failed to insert ping task");
}

#[derive(Default)]
pub struct TargetFixture {
    pub host: &'static str,
    pub isp_id: i16,
    pub province_id: i16,
    pub city_id: i16,
    pub name_tag: Option<&'static str>,
    pub probed_by_all: bool,
}

pub async fn insert_target(db: &DatabaseConnection, fixture: TargetFixture) -> i32 {
    target::ActiveModel {
        host: Set(fixture.host.to_string()),
        isp_id: Set(fixture.isp_id),
        province_id: Set(fixture.province_id),
        city_id: Set(fixture.city_id),
        name_tag: Set(fixture.name_tag.map(str::to_string)),
        probed_by_all: Set(fixture.probed_by_all),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert target")
    .id
}

pub async fn add_isp_filter(db: &DatabaseConnection, agent_id: i32, isp_id: i16) {
    target_filter_isp::ActiveModel {
        agent_id: Set(agent_id),
        isp_id: Set(isp_id),
    }
    .insert(db)
    .await
    .expect("Failed to insert ISP filter");
}

pub async fn add_province_filter(db: &DatabaseConnection, agent_id: i32, province_id: i16) {
    target_filter_province::ActiveModel {
        agent_id: Set(agent_id),
        province_id: Set(province_id),
    }
    .insert(db)
    .await
    .expect("Failed to insert province filter");
}

pub async fn add_city_filter(db: &DatabaseConnection, agent_id: i32, city_id: i16) {
    target_filter_city::ActiveModel {
        agent_id: Set(agent_id),
        city_id: Set(city_id),
    }
    .insert(db)
    .await
    .expect("Failed to insert city filter");
}

pub async fn add_name_tag_filter(db: &DatabaseConnection, agent_id: i32, name_tag: &str) {
    target_filter_name_tag::ActiveModel {
        agent_id: Set(agent_id),
        name_tag: Set(name_tag.to_string()),
    }
    .insert(db)
    .await
    .expect("Failed to insert name tag filter");
}

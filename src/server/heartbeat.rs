//! One agent report, end to end: refresh the agent, decide whether it is due,
//! and hand back its targets when it is.

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::models::{AgentAttribution, Eligibility, NewAgent, PingTarget};
use crate::db::services::{evaluate_eligibility, get_targets_by_agent, upsert_agent};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub need_ping: bool,
    pub agent: Option<AgentAttribution>,
    pub targets: Vec<PingTarget>,
}

impl HeartbeatResponse {
    fn idle() -> Self {
        Self {
            need_ping: false,
            agent: None,
            targets: Vec::new(),
        }
    }
}

pub async fn handle_heartbeat(
    db: &DatabaseConnection,
    new_agent: &NewAgent,
    checked_at: DateTime<Utc>,
) -> Result<HeartbeatResponse> {
    let agent_id = upsert_agent(db, new_agent).await?;

    let attribution = match evaluate_eligibility(db, agent_id, checked_at).await? {
        Eligibility::Due(attribution) => attribution,
        Eligibility::NotDue => return Ok(HeartbeatResponse::idle()),
    };

    let targets = get_targets_by_agent(db, agent_id).await?;
    info!(
        agent_id,
        connection_id = %new_agent.connection_id,
        target_count = targets.len(),
        "Dispatching ping task"
    );

    Ok(HeartbeatResponse {
        need_ping: true,
        agent: Some(attribution),
        targets,
    })
}

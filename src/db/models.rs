use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::db::entities::{agent, target};

/// Name tag reported for targets that have none in storage.
pub const UNDEFINED_STRING: &str = "undefined";

/// Registration data an agent reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAgent {
    pub connection_id: String,
    pub hostname: String,
    /// Raw octets, 4 bytes for IPv4 and 16 for IPv6.
    pub ip_address: Vec<u8>,
}

impl NewAgent {
    pub fn new(connection_id: impl Into<String>, hostname: impl Into<String>, ip: IpAddr) -> Self {
        let ip_address = match ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        Self {
            connection_id: connection_id.into(),
            hostname: hostname.into(),
            ip_address,
        }
    }
}

/// Geographic/provider attribution of an agent that is due to ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAttribution {
    pub agent_id: i32,
    pub isp_id: i16,
    pub province_id: i16,
    pub city_id: i16,
}

impl From<&agent::Model> for AgentAttribution {
    fn from(agent: &agent::Model) -> Self {
        Self {
            agent_id: agent.id,
            isp_id: agent.isp_id,
            province_id: agent.province_id,
            city_id: agent.city_id,
        }
    }
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    NotDue,
    /// The round has been claimed for the checked time.
    Due(AgentAttribution),
}

impl Eligibility {
    pub fn is_due(&self) -> bool {
        matches!(self, Eligibility::Due(_))
    }

    pub fn attribution(&self) -> Option<AgentAttribution> {
        match self {
            Eligibility::Due(attribution) => Some(*attribution),
            Eligibility::NotDue => None,
        }
    }
}

/// A target as handed to a probing agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingTarget {
    pub id: i32,
    pub host: String,
    pub isp_id: i16,
    pub province_id: i16,
    pub city_id: i16,
    /// [`UNDEFINED_STRING`] when the target carries no tag.
    pub name_tag: String,
}

impl From<target::Model> for PingTarget {
    fn from(model: target::Model) -> Self {
        Self {
            id: model.id,
            host: model.host,
            isp_id: model.isp_id,
            province_id: model.province_id,
            city_id: model.city_id,
            name_tag: model
                .name_tag
                .unwrap_or_else(|| UNDEFINED_STRING.to_string()),
        }
    }
}

/// Filter values configured for one agent's ping task, one set per dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentFilters {
    pub isp_ids: Vec<i16>,
    pub province_ids: Vec<i16>,
    pub city_ids: Vec<i16>,
    pub name_tags: Vec<String>,
}

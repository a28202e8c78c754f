//! Target selection for ping tasks.
//!
//! An agent's ping task is first classified by [`get_ping_task_state`]. Filtered
//! tasks then run every [`TargetRule`] on its own and the hits are merged by
//! target id, so a target matching several dimensions is reported once.

use futures::try_join;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::db::entities::{
    ping_task, target, target_filter_city, target_filter_isp, target_filter_name_tag,
    target_filter_province,
};
use crate::db::enums::{FilterDimension, PingTaskState};
use crate::db::models::{AgentFilters, PingTarget};
use crate::error::Result;

/// A single way a target can be selected for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRule {
    /// The target's attribute equals one of the agent's filter values.
    Filter(FilterDimension),
    /// The target is probed by every agent with a ping task.
    ProbedByAll,
}

impl TargetRule {
    pub const ALL: [TargetRule; 5] = [
        TargetRule::Filter(FilterDimension::Isp),
        TargetRule::Filter(FilterDimension::Province),
        TargetRule::Filter(FilterDimension::City),
        TargetRule::Filter(FilterDimension::NameTag),
        TargetRule::ProbedByAll,
    ];

    /// Condition on `nqm_target` for this rule, or `None` when it cannot match
    /// anything because the agent has no values in that dimension.
    pub fn condition(&self, filters: &AgentFilters) -> Option<SimpleExpr> {
        match self {
            TargetRule::Filter(FilterDimension::Isp) => (!filters.isp_ids.is_empty())
                .then(|| target::Column::IspId.is_in(filters.isp_ids.iter().copied())),
            TargetRule::Filter(FilterDimension::Province) => (!filters.province_ids.is_empty())
                .then(|| target::Column::ProvinceId.is_in(filters.province_ids.iter().copied())),
            TargetRule::Filter(FilterDimension::City) => (!filters.city_ids.is_empty())
                .then(|| target::Column::CityId.is_in(filters.city_ids.iter().copied())),
            TargetRule::Filter(FilterDimension::NameTag) => (!filters.name_tags.is_empty())
                .then(|| target::Column::NameTag.is_in(filters.name_tags.iter().cloned())),
            TargetRule::ProbedByAll => Some(target::Column::ProbedByAll.eq(true)),
        }
    }
}

impl fmt::Display for TargetRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRule::Filter(dimension) => write!(f, "{dimension}"),
            TargetRule::ProbedByAll => f.write_str("probed_by_all"),
        }
    }
}

/// Classifies how `agent_id` selects its targets.
pub async fn get_ping_task_state<C: ConnectionTrait>(
    db: &C,
    agent_id: i32,
) -> Result<PingTaskState> {
    let task_count = ping_task::Entity::find()
        .filter(ping_task::Column::AgentId.eq(agent_id))
        .count(db)
        .await?;
    if task_count == 0 {
        return Ok(PingTaskState::NoTask);
    }

    for dimension in FilterDimension::ALL {
        if has_filter(db, agent_id, dimension).await? {
            return Ok(PingTaskState::FilteredTask);
        }
    }

    Ok(PingTaskState::UnfilteredTask)
}

async fn has_filter<C: ConnectionTrait>(
    db: &C,
    agent_id: i32,
    dimension: FilterDimension,
) -> Result<bool, DbErr> {
    let found = match dimension {
        FilterDimension::Isp => target_filter_isp::Entity::find()
            .filter(target_filter_isp::Column::AgentId.eq(agent_id))
            .one(db)
            .await?
            .is_some(),
        FilterDimension::Province => target_filter_province::Entity::find()
            .filter(target_filter_province::Column::AgentId.eq(agent_id))
            .one(db)
            .await?
            .is_some(),
        FilterDimension::City => target_filter_city::Entity::find()
            .filter(target_filter_city::Column::AgentId.eq(agent_id))
            .one(db)
            .await?
            .is_some(),
        FilterDimension::NameTag => target_filter_name_tag::Entity::find()
            .filter(target_filter_name_tag::Column::AgentId.eq(agent_id))
            .one(db)
            .await?
            .is_some(),
    };
    Ok(found)
}

/// Loads the filter values of every dimension for `agent_id`.
pub async fn load_agent_filters<C: ConnectionTrait>(
    db: &C,
    agent_id: i32,
) -> Result<AgentFilters> {
    let isp_future = target_filter_isp::Entity::find()
        .select_only()
        .column(target_filter_isp::Column::IspId)
        .filter(target_filter_isp::Column::AgentId.eq(agent_id))
        .into_tuple::<i16>()
        .all(db);
    let province_future = target_filter_province::Entity::find()
        .select_only()
        .column(target_filter_province::Column::ProvinceId)
        .filter(target_filter_province::Column::AgentId.eq(agent_id))
        .into_tuple::<i16>()
        .all(db);
    let city_future = target_filter_city::Entity::find()
        .select_only()
        .column(target_filter_city::Column::CityId)
        .filter(target_filter_city::Column::AgentId.eq(agent_id))
        .into_tuple::<i16>()
        .all(db);
    let name_tag_future = target_filter_name_tag::Entity::find()
        .select_only()
        .column(target_filter_name_tag::Column::NameTag)
        .filter(target_filter_name_tag::Column::AgentId.eq(agent_id))
        .into_tuple::<String>()
        .all(db);

    let (isp_ids, province_ids, city_ids, name_tags) =
        try_join!(isp_future, province_future, city_future, name_tag_future)?;

    Ok(AgentFilters {
        isp_ids,
        province_ids,
        city_ids,
        name_tags,
    })
}

/// Loads the targets `agent_id` has to probe for an already classified task.
///
/// Targets are ordered by id.
pub async fn load_targets<C: ConnectionTrait>(
    db: &C,
    agent_id: i32,
    state: PingTaskState,
) -> Result<Vec<PingTarget>> {
    let rules: &[TargetRule] = match state {
        PingTaskState::NoTask => return Ok(Vec::new()),
        PingTaskState::UnfilteredTask => &[TargetRule::ProbedByAll],
        PingTaskState::FilteredTask => &TargetRule::ALL,
    };
    let filters = if state == PingTaskState::FilteredTask {
        load_agent_filters(db, agent_id).await?
    } else {
        AgentFilters::default()
    };

    let mut matched: BTreeMap<i32, target::Model> = BTreeMap::new();
    for rule in rules {
        let Some(condition) = rule.condition(&filters) else {
            continue;
        };
        let hits = target::Entity::find().filter(condition).all(db).await?;
        debug!(agent_id, rule = %rule, hits = hits.len(), "Matched targets");
        for hit in hits {
            matched.entry(hit.id).or_insert(hit);
        }
    }

    Ok(matched.into_values().map(PingTarget::from).collect())
}

/// Classifies the ping task of `agent_id` and loads its targets.
pub async fn get_targets_by_agent<C: ConnectionTrait>(
    db: &C,
    agent_id: i32,
) -> Result<Vec<PingTarget>> {
    let state = get_ping_task_state(db, agent_id).await?;
    debug!(agent_id, state = %state, "Classified ping task");
    load_targets(db, agent_id, state).await
}

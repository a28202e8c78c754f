//! Eligibility of agents for a ping round.
//!
//! The due-check and the claim on the round happen in one transaction: the task
//! row is read under an exclusive lock, and `last_executed_at` is only moved
//! forward if it still holds the value that was read. Two overlapping checks for
//! the same agent therefore never both report [`Eligibility::Due`].

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IsolationLevel, QueryFilter, QuerySelect, TransactionTrait,
};
use tracing::{debug, error, warn};

use crate::db::entities::{agent, ping_task};
use crate::db::models::{AgentAttribution, Eligibility};
use crate::error::{PingTaskError, Result};

/// Whole minutes from `since` to `until`, truncated toward zero.
pub fn elapsed_minutes(since: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
    (until - since).num_minutes()
}

/// Whether `task` of `agent` is due at `checked_at`.
///
/// A task that never ran counts from the Unix epoch. The period boundary is
/// inclusive.
pub fn is_ping_due(
    task: &ping_task::Model,
    agent: &agent::Model,
    checked_at: DateTime<Utc>,
) -> bool {
    if !agent.is_enabled() {
        return false;
    }

    let since = task.last_executed_at.unwrap_or(DateTime::UNIX_EPOCH);
    elapsed_minutes(since, checked_at) >= i64::from(task.period_minutes)
}

/// Checks whether `agent_id` has to run its ping task at `checked_at` and, if so,
/// records `checked_at` as its last execution.
///
/// Returns [`Eligibility::NotDue`] when the agent has no ping task, is disabled,
/// or its period has not elapsed yet.
pub async fn evaluate_eligibility(
    db: &DatabaseConnection,
    agent_id: i32,
    checked_at: DateTime<Utc>,
) -> Result<Eligibility> {
    let txn = db
        .begin_with_config(Some(IsolationLevel::RepeatableRead), None)
        .await?;

    // Row lock on the task only; the agent side is read plainly.
    let task = ping_task::Entity::find_by_id(agent_id)
        .lock_exclusive()
        .one(&txn)
        .await?;
    let Some(task) = task else {
        txn.commit().await?;
        return Ok(Eligibility::NotDue);
    };

    let agent = agent::Entity::find_by_id(agent_id).one(&txn).await?;
    let agent = match agent {
        Some(agent) if is_ping_due(&task, &agent, checked_at) => agent,
        _ => {
            txn.commit().await?;
            return Ok(Eligibility::NotDue);
        }
    };

    if !claim_round(txn, &task, checked_at).await? {
        debug!(agent_id, "Ping round already claimed by a concurrent check");
        return Ok(Eligibility::NotDue);
    }

    debug!(agent_id, checked_at = %checked_at, "Claimed ping round");
    Ok(Eligibility::Due(AgentAttribution::from(&agent)))
}

/// Same as [`evaluate_eligibility`] with the reference time given in Unix seconds.
pub async fn evaluate_eligibility_at_unix(
    db: &DatabaseConnection,
    agent_id: i32,
    checked_unix_secs: i64,
) -> Result<Eligibility> {
    let checked_at = DateTime::from_timestamp(checked_unix_secs, 0).ok_or_else(|| {
        PingTaskError::InvalidInput(format!("Unix time out of range: {checked_unix_secs}"))
    })?;
    evaluate_eligibility(db, agent_id, checked_at).await
}

/// Moves `last_executed_at` to `checked_at` and commits.
///
/// Returns `Ok(false)` when another transaction moved it first. Any failure rolls
/// the transaction back.
async fn claim_round(
    txn: DatabaseTransaction,
    task: &ping_task::Model,
    checked_at: DateTime<Utc>,
) -> Result<bool> {
    let agent_id = task.agent_id;

    let mut claim = ping_task::Entity::update_many()
        .col_expr(ping_task::Column::LastExecutedAt, Expr::value(checked_at))
        .filter(ping_task::Column::AgentId.eq(agent_id));
    claim = match task.last_executed_at {
        Some(previous) => claim.filter(ping_task::Column::LastExecutedAt.eq(previous)),
        None => claim.filter(ping_task::Column::LastExecutedAt.is_null()),
    };

    let rows_affected = match claim.exec(&txn).await {
        Ok(result) => result.rows_affected,
        Err(e) => {
            error!(agent_id, error = %e, "Failed to update last execution of ping task");
            if let Err(rollback_err) = txn.rollback().await {
                warn!(agent_id, error = %rollback_err, "Rollback after failed claim also failed");
            }
            return Err(PingTaskError::ClaimWrite(e));
        }
    };

    if rows_affected == 0 {
        txn.rollback().await?;
        return Ok(false);
    }

    txn.commit().await.map_err(|e| {
        error!(agent_id, error = %e, "Failed to commit ping task claim");
        PingTaskError::ClaimWrite(e)
    })?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::agent::STATUS_ENABLED;
    use crate::db::test_support::{insert_agent, insert_ping_task, setup_db};
    use chrono::Duration;
    use sea_orm::ConnectionTrait;

    fn epoch_plus_minutes(minutes: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::minutes(minutes)
    }

    fn task(period_minutes: i32, last_executed_at: Option<DateTime<Utc>>) -> ping_task::Model {
        ping_task::Model {
            agent_id: 1,
            period_minutes,
            last_executed_at,
        }
    }

    fn agent_with_status(status: i16) -> agent::Model {
        agent::Model {
            id: 1,
            connection_id: "conn".to_string(),
            hostname: "host".to_string(),
            ip_address: vec![127, 0, 0, 1],
            status,
            isp_id: 1,
            province_id: 2,
            city_id: 3,
        }
    }

    #[test]
    fn elapsed_minutes_truncates_partial_minutes() {
        let since = epoch_plus_minutes(10);
        assert_eq!(elapsed_minutes(since, since + Duration::seconds(59)), 0);
        assert_eq!(elapsed_minutes(since, since + Duration::seconds(119)), 1);
        assert_eq!(elapsed_minutes(since, since - Duration::seconds(61)), -1);
    }

    #[test]
    fn due_exactly_at_period_boundary() {
        let last = epoch_plus_minutes(1_000);
        let task = task(15, Some(last));
        let agent = agent_with_status(STATUS_ENABLED);

        assert!(!is_ping_due(&task, &agent, last + Duration::minutes(14)));
        assert!(!is_ping_due(&task, &agent, last + Duration::seconds(15 * 60 - 1)));
        assert!(is_ping_due(&task, &agent, last + Duration::minutes(15)));
        assert!(is_ping_due(&task, &agent, last + Duration::minutes(16)));
    }

    #[test]
    fn never_executed_counts_from_epoch() {
        let task = task(60, None);
        let agent = agent_with_status(STATUS_ENABLED);

        assert!(!is_ping_due(&task, &agent, epoch_plus_minutes(59)));
        assert!(is_ping_due(&task, &agent, epoch_plus_minutes(60)));
    }

    #[test]
    fn disabled_agent_is_never_due() {
        let task = task(1, None);
        assert!(!is_ping_due(&task, &agent_with_status(0), Utc::now()));
        assert!(!is_ping_due(&task, &agent_with_status(0b10), Utc::now()));
        assert!(is_ping_due(&task, &agent_with_status(0b11), Utc::now()));
    }

    #[tokio::test]
    async fn agent_without_ping_task_is_not_due() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "no-task", STATUS_ENABLED).await;

        for minutes in [0, 61, 1_000_000] {
            let result = evaluate_eligibility(&db, agent.id, epoch_plus_minutes(minutes))
                .await
                .unwrap();
            assert_eq!(result, Eligibility::NotDue);
        }
    }

    #[tokio::test]
    async fn unknown_agent_is_not_due() {
        let db = setup_db().await;
        let result = evaluate_eligibility(&db, 4242, Utc::now()).await.unwrap();
        assert_eq!(result, Eligibility::NotDue);
    }

    #[tokio::test]
    async fn periodic_rounds_are_claimed_once() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-a", STATUS_ENABLED).await;
        insert_ping_task(&db, agent.id, 60, None).await;

        let t = epoch_plus_minutes(61);
        let first = evaluate_eligibility(&db, agent.id, t).await.unwrap();
        assert_eq!(
            first,
            Eligibility::Due(AgentAttribution {
                agent_id: agent.id,
                isp_id: 3,
                province_id: 7,
                city_id: 21,
            })
        );

        let stored = ping_task::Entity::find_by_id(agent.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_executed_at, Some(t));

        let one_minute_later = evaluate_eligibility(&db, agent.id, t + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(one_minute_later, Eligibility::NotDue);

        let next_period = evaluate_eligibility(&db, agent.id, t + Duration::minutes(61))
            .await
            .unwrap();
        assert!(next_period.is_due());
    }

    #[tokio::test]
    async fn same_reference_time_fires_once() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-repeat", STATUS_ENABLED).await;
        insert_ping_task(&db, agent.id, 5, Some(epoch_plus_minutes(100))).await;

        let t = epoch_plus_minutes(105);
        assert!(evaluate_eligibility(&db, agent.id, t).await.unwrap().is_due());
        assert_eq!(
            evaluate_eligibility(&db, agent.id, t).await.unwrap(),
            Eligibility::NotDue
        );
    }

    #[tokio::test]
    async fn boundary_against_store_is_inclusive() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-boundary", STATUS_ENABLED).await;
        let last = epoch_plus_minutes(500);
        insert_ping_task(&db, agent.id, 30, Some(last)).await;

        let early = evaluate_eligibility(&db, agent.id, last + Duration::seconds(30 * 60 - 1))
            .await
            .unwrap();
        assert_eq!(early, Eligibility::NotDue);

        let on_time = evaluate_eligibility(&db, agent.id, last + Duration::minutes(30))
            .await
            .unwrap();
        assert!(on_time.is_due());
    }

    #[tokio::test]
    async fn not_due_leaves_last_execution_untouched() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-quiet", STATUS_ENABLED).await;
        let last = epoch_plus_minutes(10);
        insert_ping_task(&db, agent.id, 60, Some(last)).await;

        let result = evaluate_eligibility(&db, agent.id, last + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(result, Eligibility::NotDue);

        let stored = ping_task::Entity::find_by_id(agent.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_executed_at, Some(last));
    }

    #[tokio::test]
    async fn disabled_agent_is_not_claimed() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-off", 0).await;
        insert_ping_task(&db, agent.id, 1, None).await;

        let result = evaluate_eligibility(&db, agent.id, epoch_plus_minutes(100))
            .await
            .unwrap();
        assert_eq!(result, Eligibility::NotDue);

        let stored = ping_task::Entity::find_by_id(agent.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_executed_at.is_none());
    }

    #[tokio::test]
    async fn overlapping_checks_claim_at_most_once() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-race", STATUS_ENABLED).await;
        insert_ping_task(&db, agent.id, 10, None).await;

        let t = epoch_plus_minutes(1_000);
        let (a, b) = tokio::join!(
            evaluate_eligibility(&db, agent.id, t),
            evaluate_eligibility(&db, agent.id, t + Duration::seconds(5)),
        );
        let due_count = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|e| e.is_due())
            .count();
        assert_eq!(due_count, 1);
    }

    #[tokio::test]
    async fn stale_task_row_is_not_claimed() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-stale", STATUS_ENABLED).await;
        let claimed_at = epoch_plus_minutes(500);
        insert_ping_task(&db, agent.id, 10, Some(claimed_at)).await;

        // Snapshot taken before another check moved the last execution forward.
        let stale = ping_task::Model {
            agent_id: agent.id,
            period_minutes: 10,
            last_executed_at: None,
        };
        let txn = db.begin().await.unwrap();
        let claimed = claim_round(txn, &stale, epoch_plus_minutes(600))
            .await
            .unwrap();
        assert!(!claimed);

        let stored = ping_task::Entity::find_by_id(agent.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_executed_at, Some(claimed_at));
    }

    #[tokio::test]
    async fn failed_claim_write_is_reported_and_not_due() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-readonly", STATUS_ENABLED).await;
        insert_ping_task(&db, agent.id, 1, None).await;
        db.execute_unprepared(
            "CREATE TRIGGER reject_ping_task_update BEFORE UPDATE ON nqm_ping_task \
             BEGIN SELECT RAISE(ABORT, 'ping task is read-only'); END;",
        )
        .await
        .unwrap();

        let result = evaluate_eligibility(&db, agent.id, epoch_plus_minutes(100)).await;
        assert!(matches!(result, Err(PingTaskError::ClaimWrite(_))));

        let stored = ping_task::Entity::find_by_id(agent.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_executed_at.is_none());
    }

    #[tokio::test]
    async fn unix_reference_time_is_accepted() {
        let db = setup_db().await;
        let agent = insert_agent(&db, "agent-unix", STATUS_ENABLED).await;
        insert_ping_task(&db, agent.id, 60, None).await;

        let result = evaluate_eligibility_at_unix(&db, agent.id, 61 * 60).await.unwrap();
        assert!(result.is_due());
    }

    #[tokio::test]
    async fn out_of_range_unix_time_is_rejected() {
        let db = setup_db().await;
        let err = evaluate_eligibility_at_unix(&db, 1, i64::MAX).await.unwrap_err();
        assert!(matches!(err, PingTaskError::InvalidInput(_)));
    }
}

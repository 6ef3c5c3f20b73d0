//! Position store: persistence, state transitions and the processor queries.

use super::{decimal_col, parsed_col, Repository};
use crate::domain::{
    Decimal, OwnerId, Position, PositionId, PositionState, TermDays, TimeMs,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

const POSITION_COLUMNS: &str = r#"
    id, owner_id, principal, duration_days, reward_percentage, state,
    start_time_ms, end_time_ms, estimated_income, profit, auto_resubmit,
    version, predecessor_id, successor_id, settled_at_ms
"#;

fn row_to_position(row: &SqliteRow) -> Result<Position, sqlx::Error> {
    let days: i64 = row.try_get("duration_days")?;
    let duration = TermDays::new(days).map_err(|e| sqlx::Error::ColumnDecode {
        index: "duration_days".to_string(),
        source: Box::new(e),
    })?;

    Ok(Position {
        id: PositionId::new(row.try_get("id")?),
        owner_id: OwnerId::new(row.try_get("owner_id")?),
        principal: decimal_col(row, "principal")?,
        duration,
        reward_percentage: decimal_col(row, "reward_percentage")?,
        state: parsed_col::<PositionState>(row, "state")?,
        start_time: TimeMs::new(row.try_get("start_time_ms")?),
        end_time: TimeMs::new(row.try_get("end_time_ms")?),
        estimated_income: decimal_col(row, "estimated_income")?,
        profit: decimal_col(row, "profit")?,
        auto_resubmit: row.try_get::<i64, _>("auto_resubmit")? != 0,
        version: row.try_get("version")?,
        predecessor_id: row
            .try_get::<Option<String>, _>("predecessor_id")?
            .map(PositionId::new),
        successor_id: row
            .try_get::<Option<String>, _>("successor_id")?
            .map(PositionId::new),
        settled_at: row.try_get::<Option<i64>, _>("settled_at_ms")?.map(TimeMs::new),
    })
}

pub async fn insert<'e, E>(
    executor: E,
    position: &Position,
    created_at: TimeMs,
) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO positions (
            id, owner_id, principal, duration_days, reward_percentage, state,
            start_time_ms, end_time_ms, estimated_income, profit, auto_resubmit,
            version, predecessor_id, successor_id, settled_at_ms, created_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(position.id.as_str())
    .bind(position.owner_id.as_i64())
    .bind(position.principal.to_canonical_string())
    .bind(i64::from(position.duration))
    .bind(position.reward_percentage.to_canonical_string())
    .bind(position.state.as_str())
    .bind(position.start_time.as_ms())
    .bind(position.end_time.as_ms())
    .bind(position.estimated_income.to_canonical_string())
    .bind(position.profit.to_canonical_string())
    .bind(i64::from(position.auto_resubmit))
    .bind(position.version)
    .bind(position.predecessor_id.as_ref().map(|id| id.as_str()))
    .bind(position.successor_id.as_ref().map(|id| id.as_str()))
    .bind(position.settled_at.map(|t| t.as_ms()))
    .bind(created_at.as_ms())
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn fetch<'e, E>(executor: E, id: &PositionId) -> Result<Option<Position>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {} FROM positions WHERE id = ?", POSITION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.as_str())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(row_to_position).transpose()
}

/// A state change applied by `transition` when its guard holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: PositionState,
    pub to: PositionState,
    /// Version the caller observed; the update only applies if it still matches.
    pub expected_version: i64,
    pub profit: Decimal,
    pub settled_at: Option<TimeMs>,
}

/// Compare-and-set the position state.
///
/// Applies only while the stored row is still in `from` at `expected_version`,
/// bumping the version. Returns false when another writer got there first.
/// As the first write of a transaction this also takes the SQLite write lock.
pub async fn transition<'e, E>(
    executor: E,
    id: &PositionId,
    change: &Transition,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE positions
        SET state = ?, profit = ?, settled_at_ms = ?, version = version + 1
        WHERE id = ? AND state = ? AND version = ?
        "#,
    )
    .bind(change.to.as_str())
    .bind(change.profit.to_canonical_string())
    .bind(change.settled_at.map(|t| t.as_ms()))
    .bind(id.as_str())
    .bind(change.from.as_str())
    .bind(change.expected_version)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn set_successor<'e, E>(
    executor: E,
    id: &PositionId,
    successor_id: &PositionId,
) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE positions SET successor_id = ? WHERE id = ?")
        .bind(successor_id.as_str())
        .bind(id.as_str())
        .execute(executor)
        .await?;

    Ok(())
}

impl Repository {
    pub async fn get_position(&self, id: &PositionId) -> Result<Option<Position>, sqlx::Error> {
        fetch(&self.pool, id).await
    }

    /// Active positions whose term has elapsed at `now` (`end_time <= now`).
    pub async fn query_due_positions(&self, now: TimeMs) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM positions
            WHERE state = 'active' AND end_time_ms <= ?
            ORDER BY end_time_ms ASC, id ASC
            "#,
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now.as_ms())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_position).collect()
    }

    /// Active positions still inside their term at `now` (`end_time > now`).
    pub async fn query_accruing_positions(&self, now: TimeMs) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM positions
            WHERE state = 'active' AND end_time_ms > ?
            ORDER BY end_time_ms ASC, id ASC
            "#,
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now.as_ms())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_position).collect()
    }

    /// All positions of an owner, newest first.
    pub async fn query_positions_for_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM positions
            WHERE owner_id = ?
            ORDER BY start_time_ms DESC, created_at_ms DESC, id ASC
            "#,
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_position).collect()
    }

    /// Overwrite the cached profit of a position that is still active.
    ///
    /// Returns false if the position left the active state in the meantime.
    pub async fn update_profit_if_active(
        &self,
        id: &PositionId,
        profit: Decimal,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE positions SET profit = ? WHERE id = ? AND state = 'active'")
                .bind(profit.to_canonical_string())
                .bind(id.as_str())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Toggle auto-resubmission on an active position owned by `owner_id`.
    ///
    /// Returns false if no such active position exists.
    pub async fn set_auto_resubmit(
        &self,
        id: &PositionId,
        owner_id: OwnerId,
        flag: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET auto_resubmit = ?
            WHERE id = ? AND owner_id = ? AND state = 'active'
            "#,
        )
        .bind(i64::from(flag))
        .bind(id.as_str())
        .bind(owner_id.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_positions(
        &self,
        owner_id: OwnerId,
        state: PositionState,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM positions WHERE owner_id = ? AND state = ?")
                .bind(owner_id.as_i64())
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{Plan, DAY_MS};
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn position(owner: i64, start_ms: i64) -> Position {
        let plan = Plan::new(TermDays::new(7).unwrap(), d("1"), d("1"), d("50000")).unwrap();
        Position::open(OwnerId::new(owner), d("1000"), &plan, false, TimeMs::new(start_ms))
    }

    #[tokio::test]
    async fn test_insert_and_fetch_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let mut pos = position(1, 0);
        pos.auto_resubmit = true;
        pos.predecessor_id = Some(PositionId::new("parent".to_string()));
        insert(repo.pool(), &pos, TimeMs::new(0)).await.unwrap();

        let stored = repo.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(stored, pos);
    }

    #[tokio::test]
    async fn test_due_and_accruing_queries_split_on_end_time() {
        let (repo, _temp) = setup_repo().await;
        let due = position(1, 0);
        let not_due = position(1, DAY_MS);
        insert(repo.pool(), &due, TimeMs::new(0)).await.unwrap();
        insert(repo.pool(), &not_due, TimeMs::new(0)).await.unwrap();

        let now = due.end_time;
        let due_ids: Vec<_> = repo
            .query_due_positions(now)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(due_ids, vec![due.id.clone()]);

        let accruing_ids: Vec<_> = repo
            .query_accruing_positions(now)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(accruing_ids, vec![not_due.id.clone()]);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let (repo, _temp) = setup_repo().await;
        let pos = position(1, 0);
        insert(repo.pool(), &pos, TimeMs::new(0)).await.unwrap();

        let change = Transition {
            from: PositionState::Active,
            to: PositionState::Completed,
            expected_version: 0,
            profit: pos.estimated_income,
            settled_at: Some(pos.end_time),
        };
        assert!(transition(repo.pool(), &pos.id, &change).await.unwrap());
        assert!(!transition(repo.pool(), &pos.id, &change).await.unwrap());

        let stored = repo.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(stored.state, PositionState::Completed);
        assert_eq!(stored.version, 1);
        assert_eq!(stored.profit, d("10"));
        assert_eq!(stored.settled_at, Some(pos.end_time));
    }

    #[tokio::test]
    async fn test_profit_update_ignores_settled_positions() {
        let (repo, _temp) = setup_repo().await;
        let pos = position(1, 0);
        insert(repo.pool(), &pos, TimeMs::new(0)).await.unwrap();

        assert!(repo.update_profit_if_active(&pos.id, d("2.5")).await.unwrap());

        let change = Transition {
            from: PositionState::Active,
            to: PositionState::Completed,
            expected_version: 0,
            profit: d("10"),
            settled_at: None,
        };
        transition(repo.pool(), &pos.id, &change).await.unwrap();
        assert!(!repo.update_profit_if_active(&pos.id, d("3")).await.unwrap());

        let stored = repo.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(stored.profit, d("10"));
    }

    #[tokio::test]
    async fn test_set_auto_resubmit_checks_owner() {
        let (repo, _temp) = setup_repo().await;
        let pos = position(1, 0);
        insert(repo.pool(), &pos, TimeMs::new(0)).await.unwrap();

        assert!(!repo
            .set_auto_resubmit(&pos.id, OwnerId::new(2), true)
            .await
            .unwrap());
        assert!(repo
            .set_auto_resubmit(&pos.id, OwnerId::new(1), true)
            .await
            .unwrap());
        assert!(repo.get_position(&pos.id).await.unwrap().unwrap().auto_resubmit);
    }

    #[tokio::test]
    async fn test_owner_listing_is_newest_first() {
        let (repo, _temp) = setup_repo().await;
        let older = position(1, 0);
        let newer = position(1, DAY_MS);
        let other_owner = position(2, 0);
        for p in [&older, &newer, &other_owner] {
            insert(repo.pool(), p, TimeMs::new(0)).await.unwrap();
        }

        let listed = repo.query_positions_for_owner(OwnerId::new(1)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);
        assert_eq!(
            repo.count_positions(OwnerId::new(1), PositionState::Active)
                .await
                .unwrap(),
            2
        );
    }
}

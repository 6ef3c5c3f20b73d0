//! Plan catalog rows.

use super::{decimal_col, Repository};
use crate::domain::{Plan, TermDays, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

fn row_to_plan(row: &SqliteRow) -> Result<Plan, sqlx::Error> {
    let days: i64 = row.try_get("duration_days")?;
    let duration = TermDays::new(days).map_err(|e| sqlx::Error::ColumnDecode {
        index: "duration_days".to_string(),
        source: Box::new(e),
    })?;

    Ok(Plan {
        duration,
        label: row.try_get("label")?,
        reward_percentage: decimal_col(row, "reward_percentage")?,
        min_amount: decimal_col(row, "min_amount")?,
        max_amount: decimal_col(row, "max_amount")?,
    })
}

pub async fn fetch<'e, E>(executor: E, duration: TermDays) -> Result<Option<Plan>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT duration_days, label, reward_percentage, min_amount, max_amount
        FROM plans
        WHERE duration_days = ?
        "#,
    )
    .bind(i64::from(duration))
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_plan).transpose()
}

impl Repository {
    pub async fn get_plan(&self, duration: TermDays) -> Result<Option<Plan>, sqlx::Error> {
        fetch(&self.pool, duration).await
    }

    /// All plans ordered by duration.
    pub async fn list_plans(&self) -> Result<Vec<Plan>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT duration_days, label, reward_percentage, min_amount, max_amount
            FROM plans
            ORDER BY duration_days ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_plan).collect()
    }

    /// Seed the default catalog when no plans exist yet.
    ///
    /// Returns the number of plans inserted (0 if the catalog was populated).
    pub async fn seed_default_plans(&self) -> Result<usize, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM plans")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(0);
        }

        let defaults = Plan::default_catalog();
        let mut tx = self.pool.begin().await?;
        let now = TimeMs::now().as_ms();
        let mut inserted = 0usize;

        for plan in &defaults {
            let result = sqlx::query(
                r#"
                INSERT INTO plans (duration_days, label, reward_percentage, min_amount, max_amount, updated_at_ms)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(duration_days) DO NOTHING
                "#,
            )
            .bind(i64::from(plan.duration))
            .bind(&plan.label)
            .bind(plan.reward_percentage.to_canonical_string())
            .bind(plan.min_amount.to_canonical_string())
            .bind(plan.max_amount.to_canonical_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

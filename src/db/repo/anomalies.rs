//! Settlement anomalies flagged for review.

use super::{parsed_col, Repository};
use crate::domain::{Anomaly, AnomalyKind, OwnerId, PositionId, TimeMs};
use sqlx::{Row, SqliteExecutor};

pub async fn record<'e, E>(executor: E, anomaly: &Anomaly) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO settlement_anomalies (position_id, owner_id, kind, detail, time_ms)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(anomaly.position_id.as_str())
    .bind(anomaly.owner_id.as_i64())
    .bind(anomaly.kind.as_str())
    .bind(anomaly.detail.as_str())
    .bind(anomaly.time_ms.as_ms())
    .execute(executor)
    .await?;

    Ok(())
}

impl Repository {
    /// All recorded anomalies, oldest first.
    pub async fn list_anomalies(&self) -> Result<Vec<Anomaly>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT position_id, owner_id, kind, detail, time_ms
            FROM settlement_anomalies
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Anomaly, sqlx::Error> {
                Ok(Anomaly {
                    position_id: PositionId::new(row.try_get("position_id")?),
                    owner_id: OwnerId::new(row.try_get("owner_id")?),
                    kind: parsed_col::<AnomalyKind>(row, "kind")?,
                    detail: row.try_get("detail")?,
                    time_ms: TimeMs::new(row.try_get("time_ms")?),
                })
            })
            .collect()
    }
}

//! Balance mutation journal.

use super::{decimal_col, parsed_col, Repository};
use crate::domain::{LedgerEntry, LedgerKind, OwnerId, PositionId, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

const LEDGER_COLUMNS: &str =
    "owner_id, position_id, kind, amount, profit_delta, idempotency_key, time_ms";

fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry, sqlx::Error> {
    Ok(LedgerEntry {
        owner_id: OwnerId::new(row.try_get("owner_id")?),
        position_id: row
            .try_get::<Option<String>, _>("position_id")?
            .map(PositionId::new),
        kind: parsed_col::<LedgerKind>(row, "kind")?,
        amount: decimal_col(row, "amount")?,
        profit_delta: decimal_col(row, "profit_delta")?,
        idempotency_key: row.try_get("idempotency_key")?,
        time_ms: TimeMs::new(row.try_get("time_ms")?),
    })
}

/// Journal an entry idempotently.
///
/// Returns false if an entry with the same idempotency key already exists,
/// in which case nothing is written.
pub async fn record<'e, E>(executor: E, entry: &LedgerEntry) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_entries (owner_id, position_id, kind, amount, profit_delta, idempotency_key, time_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(idempotency_key) DO NOTHING
        "#,
    )
    .bind(entry.owner_id.as_i64())
    .bind(entry.position_id.as_ref().map(|id| id.as_str()))
    .bind(entry.kind.as_str())
    .bind(entry.amount.to_canonical_string())
    .bind(entry.profit_delta.to_canonical_string())
    .bind(entry.idempotency_key.as_str())
    .bind(entry.time_ms.as_ms())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Look up the entry journaled under `idempotency_key`, if any.
pub async fn find<'e, E>(executor: E, idempotency_key: &str) -> Result<Option<LedgerEntry>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM ledger_entries WHERE idempotency_key = ?",
        LEDGER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(idempotency_key)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(row_to_entry).transpose()
}

impl Repository {
    /// Journal entries of an owner in insertion order.
    pub async fn query_ledger(&self, owner_id: OwnerId) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE owner_id = ?
            ORDER BY id ASC
            "#,
            LEDGER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::Decimal;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_is_idempotent_per_key() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let repo = Repository::new(init_db(&db_path).await.expect("init_db failed"));

        let position_id = PositionId::new("p1".to_string());
        let entry = LedgerEntry {
            owner_id: OwnerId::new(1),
            position_id: Some(position_id.clone()),
            kind: LedgerKind::Settlement,
            amount: Decimal::from_i64(1010),
            profit_delta: Decimal::from_i64(10),
            idempotency_key: LedgerEntry::settlement_key(&position_id, 1),
            time_ms: TimeMs::new(5),
        };

        assert!(record(repo.pool(), &entry).await.unwrap());
        assert!(!record(repo.pool(), &entry).await.unwrap());

        let entries = repo.query_ledger(OwnerId::new(1)).await.unwrap();
        assert_eq!(entries, vec![entry.clone()]);

        let found = find(repo.pool(), &entry.idempotency_key).await.unwrap();
        assert_eq!(found, Some(entry));
        assert!(find(repo.pool(), "settle:p1:2").await.unwrap().is_none());
    }
}

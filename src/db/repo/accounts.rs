//! Owner account rows.

use super::{decimal_col, Repository};
use crate::domain::{OwnerId, TimeMs, UserAccount};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

fn row_to_account(row: &SqliteRow) -> Result<UserAccount, sqlx::Error> {
    Ok(UserAccount {
        owner_id: OwnerId::new(row.try_get("owner_id")?),
        available_balance: decimal_col(row, "available_balance")?,
        profit_loss: decimal_col(row, "profit_loss")?,
        version: row.try_get("version")?,
    })
}

/// Insert a new account. Returns false if the owner already has one.
pub async fn insert<'e, E>(
    executor: E,
    account: &UserAccount,
    created_at: TimeMs,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO accounts (owner_id, available_balance, profit_loss, version, created_at_ms)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(owner_id) DO NOTHING
        "#,
    )
    .bind(account.owner_id.as_i64())
    .bind(account.available_balance.to_canonical_string())
    .bind(account.profit_loss.to_canonical_string())
    .bind(account.version)
    .bind(created_at.as_ms())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Claim the account row for the current transaction.
///
/// Issues a write, so the transaction holds the SQLite write lock from here
/// until commit; concurrent balance mutations queue on `busy_timeout`. Bumps
/// the account version. Returns false if the account does not exist.
pub async fn lock<'e, E>(executor: E, owner_id: OwnerId) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE accounts SET version = version + 1 WHERE owner_id = ?")
        .bind(owner_id.as_i64())
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch<'e, E>(executor: E, owner_id: OwnerId) -> Result<Option<UserAccount>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT owner_id, available_balance, profit_loss, version FROM accounts WHERE owner_id = ?",
    )
    .bind(owner_id.as_i64())
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_account).transpose()
}

/// Write back balances read under `lock`.
///
/// The update is conditional on the version that was read; a mismatch means
/// the row changed underneath the caller and surfaces as `RowNotFound`.
pub async fn store_balances<'e, E>(executor: E, account: &UserAccount) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET available_balance = ?, profit_loss = ?
        WHERE owner_id = ? AND version = ?
        "#,
    )
    .bind(account.available_balance.to_canonical_string())
    .bind(account.profit_loss.to_canonical_string())
    .bind(account.owner_id.as_i64())
    .bind(account.version)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

impl Repository {
    /// Current balances of an owner, read fresh from the store.
    pub async fn get_account(&self, owner_id: OwnerId) -> Result<Option<UserAccount>, sqlx::Error> {
        fetch(&self.pool, owner_id).await
    }
}

//! Repository layer for database operations.
//!
//! `Repository` owns the pool and serves pool-level reads. Each submodule also
//! exposes free functions generic over `SqliteExecutor`, so a settlement can
//! compose them inside one transaction:
//! - `accounts.rs` - owner balances
//! - `plans.rs` - plan catalog
//! - `positions.rs` - position store and state transitions
//! - `ledger.rs` - balance mutation journal
//! - `anomalies.rs` - settlement irregularities

pub mod accounts;
pub mod anomalies;
pub mod ledger;
pub mod plans;
pub mod positions;

use crate::domain::Decimal;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction on a pooled connection.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

/// Read a money column stored as canonical decimal text.
pub(crate) fn decimal_col(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Map a string-typed enum column through `FromStr`.
pub(crate) fn parsed_col<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

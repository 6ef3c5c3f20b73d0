//! Store bootstrap: connection options and schema.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How long a writer waits for the SQLite write lock before failing with
/// SQLITE_BUSY. Overlapping settlements queue on this instead of erroring.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Sweeps, the refresher and HTTP handlers share the pool; writes still
/// serialize on the single SQLite writer.
const MAX_CONNECTIONS: u32 = 5;

/// Open the store at `db_path`, creating the file and its directory if
/// missing, and bring the schema up to date.
///
/// Every pooled connection runs in WAL mode so readers listing positions never
/// block a settlement in progress.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!(db_path, "Store ready");
    Ok(pool)
}

/// Apply `schema.sql`. Every statement is `IF NOT EXISTS`, so reruns are no-ops;
/// the whole schema lands in one transaction or not at all.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements: Vec<&str> = include_str!("schema.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut tx = pool.begin().await?;
    for statement in &statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    debug!(statements = statements.len(), "Schema applied");
    Ok(())
}

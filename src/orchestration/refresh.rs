//! Periodic refresh of the cached partial profit of active positions.

use crate::db::Repository;
use crate::domain::{Clock, Decimal};
use crate::engine::position_profit;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub scanned: usize,
    pub updated: usize,
    /// Within epsilon of the stored value; not written.
    pub unchanged: usize,
    /// Left the active state between scan and write.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct PartialProfitRefresher {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    epsilon: Decimal,
}

impl PartialProfitRefresher {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>, epsilon: Decimal) -> Self {
        Self {
            repo,
            clock,
            epsilon,
        }
    }

    /// Recompute profit for active positions not yet due and persist the
    /// ones that moved by more than `epsilon`. Never touches balances.
    pub async fn run_partial_profit_refresh(&self) -> Result<RefreshReport, sqlx::Error> {
        let now = self.clock.now();
        let accruing = self.repo.query_accruing_positions(now).await?;
        let mut report = RefreshReport {
            scanned: accruing.len(),
            ..Default::default()
        };

        for position in &accruing {
            let profit = position_profit(position, now);
            if (profit - position.profit).abs() <= self.epsilon {
                report.unchanged += 1;
                continue;
            }

            match self.repo.update_profit_if_active(&position.id, profit).await {
                Ok(true) => report.updated += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(position_id = %position.id, error = %e, "Failed to persist partial profit");
                }
            }
        }

        debug!(
            scanned = report.scanned,
            updated = report.updated,
            unchanged = report.unchanged,
            "Partial profit refresh finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::db::repo::positions;
    use crate::domain::{ManualClock, OwnerId, Plan, Position, TermDays, TimeMs, DAY_MS};
    use std::str::FromStr;
    use tempfile::TempDir;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup() -> (Arc<Repository>, Arc<ManualClock>, PartialProfitRefresher, Position, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let repo = Arc::new(Repository::new(init_db(&db_path).await.expect("init_db failed")));
        let clock = Arc::new(ManualClock::new(TimeMs::new(0)));
        let refresher = PartialProfitRefresher::new(repo.clone(), clock.clone(), d("0.01"));

        let plan = Plan::new(TermDays::new(7).unwrap(), d("1"), d("1"), d("50000")).unwrap();
        let pos = Position::open(OwnerId::new(1), d("1000"), &plan, false, TimeMs::new(0));
        positions::insert(repo.pool(), &pos, TimeMs::new(0)).await.unwrap();

        (repo, clock, refresher, pos, temp_dir)
    }

    #[tokio::test]
    async fn test_refresh_writes_interpolated_profit() {
        let (repo, clock, refresher, pos, _temp) = setup().await;

        clock.set(TimeMs::new(7 * DAY_MS / 2));
        let report = refresher.run_partial_profit_refresh().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.updated, 1);

        let stored = repo.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(stored.profit, d("5"));
    }

    #[tokio::test]
    async fn test_refresh_skips_changes_within_epsilon() {
        let (repo, clock, refresher, pos, _temp) = setup().await;

        // 10 * 60s / 7d is well under a cent.
        clock.set(TimeMs::new(60_000));
        let report = refresher.run_partial_profit_refresh().await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.updated, 0);

        let stored = repo.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(stored.profit, Decimal::zero());
    }

    #[tokio::test]
    async fn test_refresh_ignores_due_positions() {
        let (repo, clock, refresher, pos, _temp) = setup().await;

        clock.set(pos.end_time);
        let report = refresher.run_partial_profit_refresh().await.unwrap();
        assert_eq!(report.scanned, 0);

        let stored = repo.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(stored.profit, Decimal::zero());
        assert!(stored.is_active());
    }
}

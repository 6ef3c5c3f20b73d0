//! Periodic sweep that settles positions whose term has elapsed.

use crate::db::Repository;
use crate::domain::Clock;
use crate::orchestration::settlement::{settle_with_retry, ResubmitPolicy, SettlementOutcome};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Active positions found past their end time.
    pub due: usize,
    /// Completed and credited.
    pub credited: usize,
    /// Completed without credit (flagged as anomalies).
    pub uncredited: usize,
    pub resubmitted: usize,
    /// Auto-resubmit requested but not affordable.
    pub resubmit_skipped: usize,
    /// Already moved on by a concurrent run.
    pub skipped: usize,
    /// Left active after a store error; retried next sweep.
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &SettlementOutcome) {
        match outcome {
            SettlementOutcome::Skipped => self.skipped += 1,
            SettlementOutcome::Credited {
                successor,
                resubmit_blocked,
                ..
            } => {
                self.credited += 1;
                if successor.is_some() {
                    self.resubmitted += 1;
                }
                if *resubmit_blocked {
                    self.resubmit_skipped += 1;
                }
            }
            SettlementOutcome::Uncredited(_) => self.uncredited += 1,
        }
    }
}

#[derive(Clone)]
pub struct MaturityProcessor {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    retry_max: Duration,
}

impl MaturityProcessor {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>, retry_max: Duration) -> Self {
        Self {
            repo,
            clock,
            retry_max,
        }
    }

    /// Settle every active position with `end_time <= now`.
    ///
    /// Safe to call concurrently with itself or on demand: a position that
    /// is no longer active is skipped, so repeated sweeps never double credit.
    /// Only a failure of the due-position query aborts the run.
    pub async fn run_maturity_sweep(&self) -> Result<SweepReport, sqlx::Error> {
        let now = self.clock.now();
        let due = self.repo.query_due_positions(now).await?;
        let mut report = SweepReport {
            due: due.len(),
            ..Default::default()
        };

        for position in &due {
            match settle_with_retry(&self.repo, position, now, ResubmitPolicy::Honor, self.retry_max)
                .await
            {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        position_id = %position.id,
                        error = %e,
                        "Settlement failed, position left active for the next sweep"
                    );
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                credited = report.credited,
                resubmitted = report.resubmitted,
                uncredited = report.uncredited,
                skipped = report.skipped,
                failed = report.failed,
                "Maturity sweep finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::db::repo::{accounts, positions};
    use crate::domain::{
        AnomalyKind, Decimal, ManualClock, OwnerId, Plan, Position, PositionState, TermDays, TimeMs,
        UserAccount, DAY_MS,
    };
    use std::str::FromStr;
    use tempfile::TempDir;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup() -> (Arc<Repository>, Arc<ManualClock>, MaturityProcessor, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let repo = Arc::new(Repository::new(init_db(&db_path).await.expect("init_db failed")));
        let clock = Arc::new(ManualClock::new(TimeMs::new(0)));
        let processor = MaturityProcessor::new(repo.clone(), clock.clone(), Duration::from_millis(200));
        (repo, clock, processor, temp_dir)
    }

    async fn open(repo: &Repository, owner: i64, auto_resubmit: bool) -> Position {
        let plan = Plan::new(TermDays::new(7).unwrap(), d("1"), d("1"), d("50000")).unwrap();
        let pos = Position::open(OwnerId::new(owner), d("1000"), &plan, auto_resubmit, TimeMs::new(0));
        positions::insert(repo.pool(), &pos, TimeMs::new(0)).await.unwrap();
        pos
    }

    #[tokio::test]
    async fn test_sweep_before_maturity_does_nothing() {
        let (repo, clock, processor, _temp) = setup().await;
        accounts::insert(repo.pool(), &UserAccount::new(OwnerId::new(1), d("0")), TimeMs::new(0))
            .await
            .unwrap();
        open(&repo, 1, false).await;

        clock.set(TimeMs::new(7 * DAY_MS - 1));
        let report = processor.run_maturity_sweep().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_missing_account_completes_and_flags() {
        let (repo, clock, processor, _temp) = setup().await;
        let pos = open(&repo, 99, false).await;

        clock.set(pos.end_time);
        let report = processor.run_maturity_sweep().await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.uncredited, 1);
        assert_eq!(report.credited, 0);

        let stored = repo.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(stored.state, PositionState::Completed);
        assert_eq!(stored.profit, d("10"));

        let anomalies = repo.list_anomalies().await.unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::MissingAccount);
        assert_eq!(anomalies[0].position_id, pos.id);
        assert!(repo.get_account(OwnerId::new(99)).await.unwrap().is_none());

        // Second sweep finds nothing left to do.
        let again = processor.run_maturity_sweep().await.unwrap();
        assert_eq!(again.due, 0);
    }
}

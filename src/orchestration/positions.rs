//! Position lifecycle operations exposed to collaborators.

use crate::db::repo::{accounts, ledger, positions};
use crate::db::Repository;
use crate::domain::{
    Clock, Decimal, LedgerEntry, LedgerKind, OwnerId, Position, PositionId, PositionState,
    TermDays,
};
use crate::engine::{accrued_profit, position_profit};
use crate::orchestration::settlement::{settle, ResubmitPolicy, SettlementOutcome};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("No plan offered for a {0}-day term")]
    PlanNotFound(i64),
    #[error("Amount {amount} outside plan range {min}..={max}")]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },
    #[error("Account not found for owner {0}")]
    AccountNotFound(OwnerId),
    #[error("Account already exists for owner {0}")]
    AccountExists(OwnerId),
    #[error("Position not found: {0}")]
    NotFound(PositionId),
    #[error("Cannot move position from {from} to {to}")]
    InvalidTransition {
        from: PositionState,
        to: PositionState,
    },
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("Withdrawal of {amount} is below the minimum of {min}")]
    BelowMinimumWithdrawal { amount: Decimal, min: Decimal },
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Aggregate view over every position of one owner, with live profit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub total_invested: Decimal,
    pub active_count: usize,
    pub total_profit: Decimal,
    pub total_estimated_income: Decimal,
    pub available_balance: Decimal,
    pub profit_loss: Decimal,
}

#[derive(Clone)]
pub struct PositionService {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
}

impl PositionService {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Open a position on the plan for `duration_days`, debiting the principal.
    pub async fn create_position(
        &self,
        owner_id: OwnerId,
        principal: Decimal,
        duration_days: i64,
        auto_resubmit: bool,
    ) -> Result<Position, PositionError> {
        if !principal.is_positive() {
            return Err(PositionError::InvalidAmount(principal));
        }
        let duration =
            TermDays::new(duration_days).map_err(|_| PositionError::PlanNotFound(duration_days))?;
        let plan = self
            .repo
            .get_plan(duration)
            .await?
            .ok_or(PositionError::PlanNotFound(duration_days))?;
        if !plan.accepts_amount(principal) {
            return Err(PositionError::AmountOutOfRange {
                amount: principal,
                min: plan.min_amount,
                max: plan.max_amount,
            });
        }

        let now = self.clock.now();
        let position = Position::open(owner_id, principal, &plan, auto_resubmit, now);

        let mut tx = self.repo.begin().await?;
        if !accounts::lock(&mut *tx, owner_id).await? {
            tx.rollback().await?;
            return Err(PositionError::AccountNotFound(owner_id));
        }
        let mut account = accounts::fetch(&mut *tx, owner_id)
            .await?
            .ok_or(PositionError::AccountNotFound(owner_id))?;
        if !account.can_afford(principal) {
            tx.rollback().await?;
            return Err(PositionError::InsufficientBalance {
                required: principal,
                available: account.available_balance,
            });
        }

        positions::insert(&mut *tx, &position, now).await?;
        ledger::record(
            &mut *tx,
            &LedgerEntry {
                owner_id,
                position_id: Some(position.id.clone()),
                kind: LedgerKind::PositionOpened,
                amount: -principal,
                profit_delta: Decimal::zero(),
                idempotency_key: LedgerEntry::opening_key(&position.id),
                time_ms: now,
            },
        )
        .await?;
        account.available_balance -= principal;
        accounts::store_balances(&mut *tx, &account).await?;
        tx.commit().await?;

        info!(
            position_id = %position.id,
            owner_id = %owner_id,
            principal = %principal,
            duration = %position.duration,
            auto_resubmit,
            "Position opened"
        );
        Ok(position)
    }

    /// Positions of an owner, newest first, with profit recomputed at now.
    pub async fn positions_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Position>, PositionError> {
        let now = self.clock.now();
        let mut listed = self.repo.query_positions_for_owner(owner_id).await?;
        for position in &mut listed {
            position.profit = position_profit(position, now);
        }
        Ok(listed)
    }

    pub async fn owner_summary(&self, owner_id: OwnerId) -> Result<OwnerSummary, PositionError> {
        let listed = self.positions_for_owner(owner_id).await?;
        let account = self.repo.get_account(owner_id).await?;

        Ok(OwnerSummary {
            total_invested: listed.iter().map(|p| p.principal).sum(),
            active_count: listed.iter().filter(|p| p.is_active()).count(),
            total_profit: listed.iter().map(|p| p.profit).sum(),
            total_estimated_income: listed.iter().map(|p| p.estimated_income).sum(),
            available_balance: account
                .as_ref()
                .map(|a| a.available_balance)
                .unwrap_or_else(Decimal::zero),
            profit_loss: account
                .as_ref()
                .map(|a| a.profit_loss)
                .unwrap_or_else(Decimal::zero),
        })
    }

    /// Toggle auto-resubmission. Only the owner may do so, and only while active.
    pub async fn set_auto_resubmit(
        &self,
        id: &PositionId,
        owner_id: OwnerId,
        flag: bool,
    ) -> Result<Position, PositionError> {
        if !self.repo.set_auto_resubmit(id, owner_id, flag).await? {
            return Err(PositionError::NotFound(id.clone()));
        }
        let mut position = self
            .repo
            .get_position(id)
            .await?
            .ok_or_else(|| PositionError::NotFound(id.clone()))?;
        position.profit = position_profit(&position, self.clock.now());

        info!(position_id = %id, owner_id = %owner_id, auto_resubmit = flag, "Auto-resubmit updated");
        Ok(position)
    }

    /// Administrative override between `active` and `completed`.
    ///
    /// Completing credits the owner exactly as maturation does but never
    /// resubmits. Reactivating reverses the journaled credit and requires the
    /// owner to still hold it.
    pub async fn set_status(
        &self,
        id: &PositionId,
        target: PositionState,
    ) -> Result<Position, PositionError> {
        let position = self
            .repo
            .get_position(id)
            .await?
            .ok_or_else(|| PositionError::NotFound(id.clone()))?;

        match (position.state, target) {
            (from, to) if from == to => {}
            (PositionState::Active, PositionState::Completed) => {
                let outcome =
                    settle(&self.repo, &position, self.clock.now(), ResubmitPolicy::Never).await?;
                if outcome == SettlementOutcome::Skipped {
                    return Err(PositionError::InvalidTransition {
                        from: position.state,
                        to: target,
                    });
                }
            }
            (PositionState::Completed, PositionState::Active) => self.reactivate(&position).await?,
            (from, to) => return Err(PositionError::InvalidTransition { from, to }),
        }

        let mut updated = self
            .repo
            .get_position(id)
            .await?
            .ok_or_else(|| PositionError::NotFound(id.clone()))?;
        updated.profit = position_profit(&updated, self.clock.now());
        Ok(updated)
    }

    /// Reopen a completed position, reversing the credit its settlement made.
    ///
    /// A settlement that was never credited (missing account, duplicate
    /// credit) has nothing to reverse: the position is reopened without any
    /// balance movement and the next sweep settles it again.
    async fn reactivate(&self, observed: &Position) -> Result<(), PositionError> {
        let now = self.clock.now();
        let owner_id = observed.owner_id;

        let mut tx = self.repo.begin().await?;
        let profit = accrued_profit(
            observed.start_time,
            observed.end_time,
            observed.estimated_income,
            PositionState::Active,
            now,
        );
        let reopened = positions::transition(
            &mut *tx,
            &observed.id,
            &positions::Transition {
                from: PositionState::Completed,
                to: PositionState::Active,
                expected_version: observed.version,
                profit,
                settled_at: None,
            },
        )
        .await?;
        if !reopened {
            tx.rollback().await?;
            return Err(PositionError::InvalidTransition {
                from: PositionState::Completed,
                to: PositionState::Active,
            });
        }

        let settlement_key = LedgerEntry::settlement_key(&observed.id, observed.version);
        let Some(credit) = ledger::find(&mut *tx, &settlement_key).await? else {
            tx.commit().await?;
            info!(
                position_id = %observed.id,
                owner_id = %owner_id,
                "Position reactivated; settlement was never credited, nothing reversed"
            );
            return Ok(());
        };

        if !accounts::lock(&mut *tx, owner_id).await? {
            tx.rollback().await?;
            return Err(PositionError::AccountNotFound(owner_id));
        }
        let mut account = accounts::fetch(&mut *tx, owner_id)
            .await?
            .ok_or(PositionError::AccountNotFound(owner_id))?;
        if !account.can_afford(credit.amount) {
            tx.rollback().await?;
            return Err(PositionError::InsufficientBalance {
                required: credit.amount,
                available: account.available_balance,
            });
        }

        ledger::record(
            &mut *tx,
            &LedgerEntry {
                owner_id,
                position_id: Some(observed.id.clone()),
                kind: LedgerKind::Reactivation,
                amount: -credit.amount,
                profit_delta: -credit.profit_delta,
                idempotency_key: LedgerEntry::reactivation_key(&observed.id, observed.version),
                time_ms: now,
            },
        )
        .await?;
        account.available_balance -= credit.amount;
        account.profit_loss -= credit.profit_delta;
        accounts::store_balances(&mut *tx, &account).await?;
        tx.commit().await?;

        info!(
            position_id = %observed.id,
            owner_id = %owner_id,
            debited = %credit.amount,
            balance = %account.available_balance,
            "Position reactivated"
        );
        Ok(())
    }

    /// Administrative cancellation of an active position.
    ///
    /// Refunds the principal, forfeits any accrued profit. The position row
    /// is kept with state `cancelled`.
    pub async fn cancel_position(&self, id: &PositionId) -> Result<Position, PositionError> {
        let observed = self
            .repo
            .get_position(id)
            .await?
            .ok_or_else(|| PositionError::NotFound(id.clone()))?;
        if !observed.is_active() {
            return Err(PositionError::InvalidTransition {
                from: observed.state,
                to: PositionState::Cancelled,
            });
        }

        let now = self.clock.now();
        let owner_id = observed.owner_id;
        let mut tx = self.repo.begin().await?;
        let cancelled = positions::transition(
            &mut *tx,
            id,
            &positions::Transition {
                from: PositionState::Active,
                to: PositionState::Cancelled,
                expected_version: observed.version,
                profit: Decimal::zero(),
                settled_at: Some(now),
            },
        )
        .await?;
        if !cancelled {
            tx.rollback().await?;
            return Err(PositionError::InvalidTransition {
                from: observed.state,
                to: PositionState::Cancelled,
            });
        }

        if !accounts::lock(&mut *tx, owner_id).await? {
            tx.rollback().await?;
            return Err(PositionError::AccountNotFound(owner_id));
        }
        let mut account = accounts::fetch(&mut *tx, owner_id)
            .await?
            .ok_or(PositionError::AccountNotFound(owner_id))?;
        ledger::record(
            &mut *tx,
            &LedgerEntry {
                owner_id,
                position_id: Some(id.clone()),
                kind: LedgerKind::Cancellation,
                amount: observed.principal,
                profit_delta: Decimal::zero(),
                idempotency_key: LedgerEntry::cancellation_key(id),
                time_ms: now,
            },
        )
        .await?;
        account.available_balance += observed.principal;
        accounts::store_balances(&mut *tx, &account).await?;
        tx.commit().await?;

        info!(
            position_id = %id,
            owner_id = %owner_id,
            refunded = %observed.principal,
            "Position cancelled"
        );

        self.repo
            .get_position(id)
            .await?
            .ok_or_else(|| PositionError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{ManualClock, TimeMs, UserAccount, DAY_MS};
    use std::str::FromStr;
    use tempfile::TempDir;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup(balance: &str) -> (Arc<Repository>, Arc<ManualClock>, PositionService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let repo = Arc::new(Repository::new(init_db(&db_path).await.expect("init_db failed")));
        repo.seed_default_plans().await.unwrap();
        accounts::insert(repo.pool(), &UserAccount::new(OwnerId::new(1), d(balance)), TimeMs::new(0))
            .await
            .unwrap();
        let clock = Arc::new(ManualClock::new(TimeMs::new(0)));
        let service = PositionService::new(repo.clone(), clock.clone());
        (repo, clock, service, temp_dir)
    }

    #[tokio::test]
    async fn test_create_debits_principal() {
        let (repo, _clock, service, _temp) = setup("5000").await;

        let pos = service
            .create_position(OwnerId::new(1), d("1000"), 7, false)
            .await
            .unwrap();
        assert_eq!(pos.estimated_income, d("10"));
        assert_eq!(pos.end_time, TimeMs::new(7 * DAY_MS));

        let account = repo.get_account(OwnerId::new(1)).await.unwrap().unwrap();
        assert_eq!(account.available_balance, d("4000"));
        assert!(repo.get_position(&pos.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_validation_errors() {
        let (repo, _clock, service, _temp) = setup("500").await;
        let owner = OwnerId::new(1);

        assert!(matches!(
            service.create_position(owner, d("100"), 3, false).await,
            Err(PositionError::PlanNotFound(3))
        ));
        assert!(matches!(
            service.create_position(owner, d("60000"), 7, false).await,
            Err(PositionError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            service.create_position(owner, d("0"), 7, false).await,
            Err(PositionError::InvalidAmount(_))
        ));
        assert!(matches!(
            service.create_position(owner, d("1000"), 7, false).await,
            Err(PositionError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            service.create_position(OwnerId::new(2), d("10"), 7, false).await,
            Err(PositionError::AccountNotFound(_))
        ));

        let account = repo.get_account(owner).await.unwrap().unwrap();
        assert_eq!(account.available_balance, d("500"));
        assert!(repo.query_positions_for_owner(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_and_summary_use_live_profit() {
        let (_repo, clock, service, _temp) = setup("5000").await;
        let owner = OwnerId::new(1);
        service.create_position(owner, d("1000"), 7, false).await.unwrap();

        clock.set(TimeMs::new(7 * DAY_MS / 2));
        let listed = service.positions_for_owner(owner).await.unwrap();
        assert_eq!(listed[0].profit, d("5"));

        let summary = service.owner_summary(owner).await.unwrap();
        assert_eq!(summary.total_invested, d("1000"));
        assert_eq!(summary.active_count, 1);
        assert_eq!(summary.total_profit, d("5"));
        assert_eq!(summary.total_estimated_income, d("10"));
        assert_eq!(summary.available_balance, d("4000"));
    }

    #[tokio::test]
    async fn test_set_auto_resubmit_requires_owner() {
        let (_repo, _clock, service, _temp) = setup("5000").await;
        let pos = service
            .create_position(OwnerId::new(1), d("1000"), 7, false)
            .await
            .unwrap();

        assert!(matches!(
            service.set_auto_resubmit(&pos.id, OwnerId::new(2), true).await,
            Err(PositionError::NotFound(_))
        ));
        let updated = service
            .set_auto_resubmit(&pos.id, OwnerId::new(1), true)
            .await
            .unwrap();
        assert!(updated.auto_resubmit);
    }

    #[tokio::test]
    async fn test_admin_complete_then_reactivate() {
        let (repo, clock, service, _temp) = setup("1000").await;
        let owner = OwnerId::new(1);
        let pos = service.create_position(owner, d("1000"), 7, true).await.unwrap();

        clock.set(TimeMs::new(DAY_MS));
        let completed = service.set_status(&pos.id, PositionState::Completed).await.unwrap();
        assert_eq!(completed.state, PositionState::Completed);
        assert_eq!(completed.profit, d("10"));
        // No resubmission on administrative completion.
        assert_eq!(repo.count_positions(owner, PositionState::Active).await.unwrap(), 0);
        let account = repo.get_account(owner).await.unwrap().unwrap();
        assert_eq!(account.available_balance, d("1010"));
        assert_eq!(account.profit_loss, d("10"));

        let reopened = service.set_status(&pos.id, PositionState::Active).await.unwrap();
        assert_eq!(reopened.state, PositionState::Active);
        assert!(reopened.settled_at.is_none());
        let account = repo.get_account(owner).await.unwrap().unwrap();
        assert_eq!(account.available_balance, d("0"));
        assert_eq!(account.profit_loss, d("0"));
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let (_repo, _clock, service, _temp) = setup("5000").await;
        let pos = service
            .create_position(OwnerId::new(1), d("1000"), 7, false)
            .await
            .unwrap();

        service.cancel_position(&pos.id).await.unwrap();
        assert!(matches!(
            service.set_status(&pos.id, PositionState::Active).await,
            Err(PositionError::InvalidTransition { .. })
        ));
        assert!(matches!(
            service.cancel_position(&pos.id).await,
            Err(PositionError::InvalidTransition { .. })
        ));
        assert!(matches!(
            service
                .set_status(&PositionId::new("missing".to_string()), PositionState::Completed)
                .await,
            Err(PositionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_refunds_principal_only() {
        let (repo, clock, service, _temp) = setup("1000").await;
        let owner = OwnerId::new(1);
        let pos = service.create_position(owner, d("1000"), 7, false).await.unwrap();

        clock.set(TimeMs::new(3 * DAY_MS));
        let cancelled = service.cancel_position(&pos.id).await.unwrap();
        assert_eq!(cancelled.state, PositionState::Cancelled);
        assert_eq!(cancelled.profit, Decimal::zero());

        let account = repo.get_account(owner).await.unwrap().unwrap();
        assert_eq!(account.available_balance, d("1000"));
        assert_eq!(account.profit_loss, Decimal::zero());
    }
}

//! Administrative funding and withdrawal on owner accounts.

use crate::db::repo::{accounts, ledger};
use crate::db::Repository;
use crate::domain::{
    Clock, Decimal, LedgerEntry, LedgerKind, OwnerId, TimeMs, UserAccount, MIN_WITHDRAWAL,
};
use crate::orchestration::positions::PositionError;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct AccountService {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Create an account, journaling a non-zero opening balance as a deposit.
    pub async fn open_account(
        &self,
        owner_id: OwnerId,
        initial_balance: Decimal,
    ) -> Result<UserAccount, PositionError> {
        if initial_balance.is_negative() {
            return Err(PositionError::InvalidAmount(initial_balance));
        }

        let now = self.clock.now();
        let account = UserAccount::new(owner_id, initial_balance);
        let mut tx = self.repo.begin().await?;
        if !accounts::insert(&mut *tx, &account, now).await? {
            tx.rollback().await?;
            return Err(PositionError::AccountExists(owner_id));
        }
        if initial_balance.is_positive() {
            ledger::record(&mut *tx, &funding_entry(LedgerKind::Deposit, owner_id, initial_balance, now))
                .await?;
        }
        tx.commit().await?;

        info!(owner_id = %owner_id, balance = %initial_balance, "Account opened");
        Ok(account)
    }

    pub async fn deposit(
        &self,
        owner_id: OwnerId,
        amount: Decimal,
    ) -> Result<UserAccount, PositionError> {
        if !amount.is_positive() {
            return Err(PositionError::InvalidAmount(amount));
        }

        let now = self.clock.now();
        let mut tx = self.repo.begin().await?;
        if !accounts::lock(&mut *tx, owner_id).await? {
            tx.rollback().await?;
            return Err(PositionError::AccountNotFound(owner_id));
        }
        let mut account = accounts::fetch(&mut *tx, owner_id)
            .await?
            .ok_or(PositionError::AccountNotFound(owner_id))?;
        ledger::record(&mut *tx, &funding_entry(LedgerKind::Deposit, owner_id, amount, now)).await?;
        account.available_balance += amount;
        accounts::store_balances(&mut *tx, &account).await?;
        tx.commit().await?;

        info!(owner_id = %owner_id, amount = %amount, balance = %account.available_balance, "Deposit credited");
        Ok(account)
    }

    /// Debit `amount` from the owner's available balance.
    ///
    /// Serialized with settlement through the account lock, so a concurrent
    /// credit is either fully visible or not yet applied.
    pub async fn withdraw(
        &self,
        owner_id: OwnerId,
        amount: Decimal,
    ) -> Result<UserAccount, PositionError> {
        if !amount.is_positive() {
            return Err(PositionError::InvalidAmount(amount));
        }
        let min = Decimal::from_i64(MIN_WITHDRAWAL);
        if amount < min {
            return Err(PositionError::BelowMinimumWithdrawal { amount, min });
        }

        let now = self.clock.now();
        let mut tx = self.repo.begin().await?;
        if !accounts::lock(&mut *tx, owner_id).await? {
            tx.rollback().await?;
            return Err(PositionError::AccountNotFound(owner_id));
        }
        let mut account = accounts::fetch(&mut *tx, owner_id)
            .await?
            .ok_or(PositionError::AccountNotFound(owner_id))?;
        if !account.can_afford(amount) {
            tx.rollback().await?;
            return Err(PositionError::InsufficientBalance {
                required: amount,
                available: account.available_balance,
            });
        }
        ledger::record(
            &mut *tx,
            &funding_entry(LedgerKind::Withdrawal, owner_id, -amount, now),
        )
        .await?;
        account.available_balance -= amount;
        accounts::store_balances(&mut *tx, &account).await?;
        tx.commit().await?;

        info!(owner_id = %owner_id, amount = %amount, balance = %account.available_balance, "Withdrawal debited");
        Ok(account)
    }

    pub async fn account(&self, owner_id: OwnerId) -> Result<UserAccount, PositionError> {
        self.repo
            .get_account(owner_id)
            .await?
            .ok_or(PositionError::AccountNotFound(owner_id))
    }
}

fn funding_entry(kind: LedgerKind, owner_id: OwnerId, amount: Decimal, now: TimeMs) -> LedgerEntry {
    LedgerEntry {
        owner_id,
        position_id: None,
        kind,
        amount,
        profit_delta: Decimal::zero(),
        idempotency_key: format!("{}:{}:{}", kind, owner_id, Uuid::new_v4()),
        time_ms: now,
    }
}

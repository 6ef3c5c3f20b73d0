//! Atomic settlement of a single matured position.
//!
//! One SQLite transaction covers, in order:
//! 1. compare-and-set `active -> completed` (takes the write lock),
//! 2. crediting `principal + estimated_income` to the owner,
//! 3. the optional auto-resubmission debit and successor insert.
//!
//! Any failure rolls the whole unit back, leaving the position active for the
//! next sweep. The credit is journaled under a per-settlement idempotency key
//! so a replay can never credit twice.

use crate::db::repo::{accounts, anomalies, ledger, positions};
use crate::db::Repository;
use crate::domain::{
    Anomaly, AnomalyKind, Decimal, LedgerEntry, LedgerKind, Position, PositionId, PositionState,
    TimeMs,
};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Whether a settlement may roll the principal into a successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubmitPolicy {
    /// Honor the position's `auto_resubmit` flag (scheduled maturation).
    Honor,
    /// Never resubmit (administrative completion).
    Never,
}

/// Result of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The position was no longer active at the observed version.
    Skipped,
    /// Owner credited with `payout`.
    Credited {
        payout: Decimal,
        successor: Option<PositionId>,
        /// Auto-resubmit was requested but the balance could not cover it.
        resubmit_blocked: bool,
    },
    /// Position completed but the ledger was not credited.
    Uncredited(AnomalyKind),
}

/// Settle `observed` at `now` in a single transaction.
pub async fn settle(
    repo: &Repository,
    observed: &Position,
    now: TimeMs,
    policy: ResubmitPolicy,
) -> Result<SettlementOutcome, sqlx::Error> {
    let mut tx = repo.begin().await?;

    let claimed = positions::transition(
        &mut *tx,
        &observed.id,
        &positions::Transition {
            from: PositionState::Active,
            to: PositionState::Completed,
            expected_version: observed.version,
            profit: observed.estimated_income,
            settled_at: Some(now),
        },
    )
    .await?;
    if !claimed {
        tx.rollback().await?;
        debug!(position_id = %observed.id, "Position already moved on, skipping");
        return Ok(SettlementOutcome::Skipped);
    }

    // Re-read under the lock: auto_resubmit may have been toggled since the scan.
    let position = positions::fetch(&mut *tx, &observed.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    let settled_version = position.version;
    let owner_id = position.owner_id;

    if !accounts::lock(&mut *tx, owner_id).await? {
        flag(
            &mut tx,
            &position,
            AnomalyKind::MissingAccount,
            format!("owner {} not found; payout {} not credited", owner_id, position.payout()),
            now,
        )
        .await?;
        tx.commit().await?;
        return Ok(SettlementOutcome::Uncredited(AnomalyKind::MissingAccount));
    }
    let mut account = accounts::fetch(&mut *tx, owner_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    let payout = position.payout();
    let credit = LedgerEntry {
        owner_id,
        position_id: Some(position.id.clone()),
        kind: LedgerKind::Settlement,
        amount: payout,
        profit_delta: position.estimated_income,
        idempotency_key: LedgerEntry::settlement_key(&position.id, settled_version),
        time_ms: now,
    };
    if !ledger::record(&mut *tx, &credit).await? {
        flag(
            &mut tx,
            &position,
            AnomalyKind::DuplicateCredit,
            format!("credit {} already journaled", credit.idempotency_key),
            now,
        )
        .await?;
        tx.commit().await?;
        return Ok(SettlementOutcome::Uncredited(AnomalyKind::DuplicateCredit));
    }
    account.available_balance += payout;
    account.profit_loss += position.estimated_income;

    let mut successor = None;
    let mut resubmit_blocked = false;
    if policy == ResubmitPolicy::Honor && position.auto_resubmit {
        if account.can_afford(position.principal) {
            let next = position.successor(now);
            let debit = LedgerEntry {
                owner_id,
                position_id: Some(next.id.clone()),
                kind: LedgerKind::Resubmission,
                amount: -position.principal,
                profit_delta: Decimal::zero(),
                idempotency_key: LedgerEntry::resubmission_key(&position.id, settled_version),
                time_ms: now,
            };
            if ledger::record(&mut *tx, &debit).await? {
                positions::insert(&mut *tx, &next, now).await?;
                positions::set_successor(&mut *tx, &position.id, &next.id).await?;
                account.available_balance -= position.principal;
                successor = Some(next.id);
            }
        } else {
            resubmit_blocked = true;
        }
    }

    accounts::store_balances(&mut *tx, &account).await?;
    tx.commit().await?;

    info!(
        position_id = %position.id,
        owner_id = %owner_id,
        principal = %position.principal,
        profit = %position.estimated_income,
        balance = %account.available_balance,
        "Position settled"
    );
    if let Some(next_id) = &successor {
        info!(
            position_id = %position.id,
            successor_id = %next_id,
            owner_id = %owner_id,
            amount = %position.principal,
            "Position auto-resubmitted"
        );
    }
    if resubmit_blocked {
        info!(
            position_id = %position.id,
            owner_id = %owner_id,
            required = %position.principal,
            available = %account.available_balance,
            "Auto-resubmit skipped: insufficient balance"
        );
    }

    Ok(SettlementOutcome::Credited {
        payout,
        successor,
        resubmit_blocked,
    })
}

async fn flag(
    tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
    position: &Position,
    kind: AnomalyKind,
    detail: String,
    now: TimeMs,
) -> Result<(), sqlx::Error> {
    warn!(
        position_id = %position.id,
        owner_id = %position.owner_id,
        kind = kind.as_str(),
        detail = %detail,
        "Settlement anomaly: position completed without credit"
    );
    anomalies::record(
        &mut **tx,
        &Anomaly {
            position_id: position.id.clone(),
            owner_id: position.owner_id,
            kind,
            detail,
            time_ms: now,
        },
    )
    .await
}

/// Busy/locked database or an exhausted pool: worth another attempt.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_RECOVERY, SQLITE_BUSY_SNAPSHOT
            Some("5") | Some("6") | Some("261") | Some("517")
        ),
        _ => false,
    }
}

/// [`settle`] with exponential backoff on transient store errors.
///
/// Gives up after `max_elapsed`; the position stays active for the next run.
pub async fn settle_with_retry(
    repo: &Repository,
    observed: &Position,
    now: TimeMs,
    policy: ResubmitPolicy,
    max_elapsed: Duration,
) -> Result<SettlementOutcome, sqlx::Error> {
    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(20),
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    retry(backoff, move || async move {
        settle(repo, observed, now, policy).await.map_err(|e| {
            if is_transient(&e) {
                warn!(position_id = %observed.id, error = %e, "Transient store error, retrying settlement");
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .await
}

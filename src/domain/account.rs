//! Owner balance ledger records.

use crate::domain::{Decimal, OwnerId, PositionId, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spendable balance and cumulative realized profit of one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub owner_id: OwnerId,
    pub available_balance: Decimal,
    pub profit_loss: Decimal,
    pub version: i64,
}

/// Smallest amount an owner may withdraw in one request.
pub const MIN_WITHDRAWAL: i64 = 100;

impl UserAccount {
    pub fn new(owner_id: OwnerId, available_balance: Decimal) -> Self {
        Self {
            owner_id,
            available_balance,
            profit_loss: Decimal::zero(),
            version: 0,
        }
    }

    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.available_balance >= amount
    }
}

/// Reason a balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Deposit,
    PositionOpened,
    Settlement,
    Resubmission,
    Reactivation,
    Cancellation,
    Withdrawal,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Deposit => "deposit",
            LedgerKind::PositionOpened => "position_opened",
            LedgerKind::Settlement => "settlement",
            LedgerKind::Resubmission => "resubmission",
            LedgerKind::Reactivation => "reactivation",
            LedgerKind::Cancellation => "cancellation",
            LedgerKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(LedgerKind::Deposit),
            "position_opened" => Ok(LedgerKind::PositionOpened),
            "settlement" => Ok(LedgerKind::Settlement),
            "resubmission" => Ok(LedgerKind::Resubmission),
            "reactivation" => Ok(LedgerKind::Reactivation),
            "cancellation" => Ok(LedgerKind::Cancellation),
            "withdrawal" => Ok(LedgerKind::Withdrawal),
            other => Err(format!("unknown ledger kind: {}", other)),
        }
    }
}

/// One journaled balance mutation.
///
/// `amount` is the signed change to `available_balance`; `profit_delta` the
/// signed change to `profit_loss`. The idempotency key is unique per store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub owner_id: OwnerId,
    pub position_id: Option<PositionId>,
    pub kind: LedgerKind,
    pub amount: Decimal,
    pub profit_delta: Decimal,
    pub idempotency_key: String,
    pub time_ms: TimeMs,
}

impl LedgerEntry {
    /// Key guarding the credit of one settlement of `position_id` at `version`.
    pub fn settlement_key(position_id: &PositionId, version: i64) -> String {
        format!("settle:{}:{}", position_id, version)
    }

    pub fn resubmission_key(position_id: &PositionId, version: i64) -> String {
        format!("resubmit:{}:{}", position_id, version)
    }

    pub fn opening_key(position_id: &PositionId) -> String {
        format!("open:{}", position_id)
    }

    pub fn reactivation_key(position_id: &PositionId, version: i64) -> String {
        format!("reactivate:{}:{}", position_id, version)
    }

    pub fn cancellation_key(position_id: &PositionId) -> String {
        format!("cancel:{}", position_id)
    }
}

/// Settlement irregularity kept for back-office review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Position completed but no account to credit.
    MissingAccount,
    /// A credit for this settlement was already journaled.
    DuplicateCredit,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::MissingAccount => "missing_account",
            AnomalyKind::DuplicateCredit => "duplicate_credit",
        }
    }
}

impl FromStr for AnomalyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing_account" => Ok(AnomalyKind::MissingAccount),
            "duplicate_credit" => Ok(AnomalyKind::DuplicateCredit),
            other => Err(format!("unknown anomaly kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub position_id: PositionId,
    pub owner_id: OwnerId,
    pub kind: AnomalyKind,
    pub detail: String,
    pub time_ms: TimeMs,
}

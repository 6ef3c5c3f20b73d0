//! Fixed-term investment position.

use crate::domain::{Decimal, OwnerId, Plan, PositionId, TermDays, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    Active,
    Completed,
    Cancelled,
}

impl PositionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionState::Active => "active",
            PositionState::Completed => "completed",
            PositionState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PositionState::Active),
            "completed" => Ok(PositionState::Completed),
            "cancelled" => Ok(PositionState::Cancelled),
            other => Err(format!("unknown position state: {}", other)),
        }
    }
}

/// A single fixed-term commitment.
///
/// Everything except `state`, `profit`, `auto_resubmit`, `version` and the
/// settlement bookkeeping fields is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub owner_id: OwnerId,
    pub principal: Decimal,
    pub duration: TermDays,
    pub reward_percentage: Decimal,
    pub state: PositionState,
    pub start_time: TimeMs,
    pub end_time: TimeMs,
    pub estimated_income: Decimal,
    /// Display cache of realized profit; recompute with `engine::accrued_profit`.
    pub profit: Decimal,
    pub auto_resubmit: bool,
    /// Bumped on every state transition; settlement compares against it.
    pub version: i64,
    /// Position whose maturation spawned this one.
    pub predecessor_id: Option<PositionId>,
    /// Position spawned by auto-resubmission at maturity.
    pub successor_id: Option<PositionId>,
    pub settled_at: Option<TimeMs>,
}

impl Position {
    /// Open a new active position on the terms of `plan`, starting at `start_time`.
    pub fn open(
        owner_id: OwnerId,
        principal: Decimal,
        plan: &Plan,
        auto_resubmit: bool,
        start_time: TimeMs,
    ) -> Self {
        Self::with_terms(
            owner_id,
            principal,
            plan.duration,
            plan.reward_percentage,
            auto_resubmit,
            start_time,
        )
    }

    /// Open a new active position with explicit terms.
    pub fn with_terms(
        owner_id: OwnerId,
        principal: Decimal,
        duration: TermDays,
        reward_percentage: Decimal,
        auto_resubmit: bool,
        start_time: TimeMs,
    ) -> Self {
        Self {
            id: PositionId::generate(),
            owner_id,
            principal,
            duration,
            reward_percentage,
            state: PositionState::Active,
            start_time,
            end_time: start_time.plus_days(duration),
            estimated_income: principal.percent(reward_percentage),
            profit: Decimal::zero(),
            auto_resubmit,
            version: 0,
            predecessor_id: None,
            successor_id: None,
            settled_at: None,
        }
    }

    /// The position that replaces this one when it is auto-resubmitted at `now`.
    pub fn successor(&self, now: TimeMs) -> Self {
        let mut next = Self::with_terms(
            self.owner_id,
            self.principal,
            self.duration,
            self.reward_percentage,
            self.auto_resubmit,
            now,
        );
        next.predecessor_id = Some(self.id.clone());
        next
    }

    pub fn is_active(&self) -> bool {
        self.state == PositionState::Active
    }

    /// Amount returned to the owner at maturity.
    pub fn payout(&self) -> Decimal {
        self.principal + self.estimated_income
    }
}

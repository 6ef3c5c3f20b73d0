//! Plan catalog entries.

use crate::domain::{Decimal, TermDays};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Terms offered for new positions of one duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub duration: TermDays,
    pub label: String,
    /// Percentage of principal earned over the full term.
    pub reward_percentage: Decimal,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("reward percentage must be within 0..=100, got {0}")]
    RewardOutOfRange(Decimal),
    #[error("amount bounds must satisfy 0 <= min <= max, got {min}..{max}")]
    InvalidBounds { min: Decimal, max: Decimal },
}

impl Plan {
    pub fn new(
        duration: TermDays,
        reward_percentage: Decimal,
        min_amount: Decimal,
        max_amount: Decimal,
    ) -> Result<Self, PlanError> {
        if reward_percentage.is_negative() || reward_percentage > Decimal::hundred() {
            return Err(PlanError::RewardOutOfRange(reward_percentage));
        }
        if min_amount.is_negative() || min_amount > max_amount {
            return Err(PlanError::InvalidBounds {
                min: min_amount,
                max: max_amount,
            });
        }
        Ok(Self {
            duration,
            label: duration.label(),
            reward_percentage,
            min_amount,
            max_amount,
        })
    }

    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }

    /// The catalog seeded into an empty store.
    pub fn default_catalog() -> Vec<Plan> {
        [
            (1, "0.1", "10000"),
            (7, "1", "50000"),
            (15, "2.5", "100000"),
            (30, "4.5", "200000"),
            (60, "10", "500000"),
            (90, "19.5", "1000000"),
        ]
        .into_iter()
        .filter_map(|(days, pct, max)| {
            let duration = TermDays::new(days).ok()?;
            let pct = Decimal::from_str(pct).ok()?;
            let max = Decimal::from_str(max).ok()?;
            Plan::new(duration, pct, Decimal::one(), max).ok()
        })
        .collect()
    }
}

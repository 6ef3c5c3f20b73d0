//! Time-weighted profit accrual.

use crate::domain::{Decimal, Position, PositionState, TimeMs, PROFIT_SCALE};

/// Profit realized so far by a position with the given terms.
///
/// Completed positions (and active ones past `end_time`) hold the full
/// `estimated_income`, cancelled ones hold nothing, and active ones accrue
/// linearly between `start_time` and `end_time`. The result always lies in
/// `0..=estimated_income` and is non-decreasing in `now`.
pub fn accrued_profit(
    start_time: TimeMs,
    end_time: TimeMs,
    estimated_income: Decimal,
    state: PositionState,
    now: TimeMs,
) -> Decimal {
    match state {
        PositionState::Completed => estimated_income,
        PositionState::Cancelled => Decimal::zero(),
        PositionState::Active if now >= end_time => estimated_income,
        PositionState::Active => {
            let total = end_time.as_ms() - start_time.as_ms();
            let elapsed = now.as_ms() - start_time.as_ms();
            // Degenerate interval: not yet at end_time, so nothing has accrued.
            if total <= 0 || elapsed <= 0 {
                return Decimal::zero();
            }
            let accrued = estimated_income * Decimal::from_i64(elapsed) / Decimal::from_i64(total);
            accrued.round_dp(PROFIT_SCALE).min(estimated_income)
        }
    }
}

/// [`accrued_profit`] for a stored position.
pub fn position_profit(position: &Position, now: TimeMs) -> Decimal {
    accrued_profit(
        position.start_time,
        position.end_time,
        position.estimated_income,
        position.state,
        now,
    )
}

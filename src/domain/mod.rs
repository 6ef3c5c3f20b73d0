//! Domain types for fixed-term positions and owner balances.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Primitives: TimeMs, OwnerId, PositionId, TermDays
//! - Plan catalog entries, positions, accounts and ledger journal records
//! - The Clock seam used by the periodic processors

pub mod account;
pub mod clock;
pub mod decimal;
pub mod plan;
pub mod position;
pub mod primitives;

pub use account::{Anomaly, AnomalyKind, LedgerEntry, LedgerKind, UserAccount, MIN_WITHDRAWAL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{Decimal, PROFIT_SCALE};
pub use plan::{Plan, PlanError};
pub use position::{Position, PositionState};
pub use primitives::{OwnerId, PositionId, TermDays, TermDaysError, TimeMs, DAY_MS};

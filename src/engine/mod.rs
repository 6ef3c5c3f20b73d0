//! Pure computation for position accounting.

pub mod accrual;

pub use accrual::{accrued_profit, position_profit};

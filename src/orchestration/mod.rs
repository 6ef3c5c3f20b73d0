pub mod accounts;
pub mod maturity;
pub mod positions;
pub mod refresh;
pub mod scheduler;
pub mod settlement;

pub use accounts::AccountService;
pub use maturity::{MaturityProcessor, SweepReport};
pub use positions::{OwnerSummary, PositionError, PositionService};
pub use refresh::{PartialProfitRefresher, RefreshReport};
pub use scheduler::Scheduler;
pub use settlement::{settle, settle_with_retry, ResubmitPolicy, SettlementOutcome};

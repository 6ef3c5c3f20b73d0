pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Clock, Decimal, ManualClock, OwnerId, Plan, Position, PositionId, PositionState, SystemClock,
    TermDays, TimeMs, UserAccount,
};
pub use error::AppError;
pub use orchestration::{
    AccountService, MaturityProcessor, PartialProfitRefresher, PositionError, PositionService,
    Scheduler,
};

pub mod config;
pub mod error;
pub mod ledger;
pub mod lending;
pub mod loans;
pub mod service;
pub mod store;
pub mod types;

#[cfg(feature = "scenario")]
pub mod scenario;

pub use config::EngineConfig;
pub use error::LoanbookError;
pub use service::{Clock, FixedClock, LoanAccountingService, SystemClock};
pub use types::*;

/// Standard result type for all loanbook operations
pub type LoanbookResult<T> = Result<T, LoanbookError>;

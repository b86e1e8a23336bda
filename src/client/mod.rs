//! Client Module
//!
//! Rate gate, single-attempt executor and the retry loop around it.

pub mod executor;
pub mod rate_gate;
pub mod retry;

pub use executor::{AttemptOutcome, RequestExecutor, RetryReason};
pub use rate_gate::RateGate;
pub use retry::{RetryBudget, RetryScheduler};

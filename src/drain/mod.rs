//! The drain pipeline: converts redeemed credentials into custodial
//! transfers and tracks their multi-stage completion. See SPEC_FULL.md §4.5.

pub mod batch_submitter;
pub mod classify;
pub mod executor;
pub mod ingest;
pub mod mint_executor;
pub mod poll_checker;
pub mod retry_arbiter;

pub use batch_submitter::BatchSubmitter;
pub use executor::DrainExecutor;
pub use ingest::DrainIngest;
pub use mint_executor::MintExecutor;
pub use poll_checker::PollChecker;
pub use retry_arbiter::RetryArbiter;

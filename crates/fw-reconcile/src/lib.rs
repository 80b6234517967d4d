//! fw-reconcile
//!
//! Detection-and-recovery engine.
//!
//! Each tick, per instrument:
//! - read the persisted watermark (abort on outage, never assume "no state")
//! - observe the control file and watched directory
//! - publish every run above the watermark strictly in sequence order
//! - advance the watermark only after the broker confirms
//!
//! Retryable publish failures stop the tick at that run (ordering preserved);
//! permanent failures mark the run `Skipped` and processing continues.
//! Dependencies are reached through the traits in [`ports`] so the engine
//! can be driven by in-memory fakes.

mod engine;
mod ledger;
mod observer;
mod outcome;
pub mod ports;
mod retry;
mod shutdown;

pub use engine::{EngineSettings, InstrumentContext, ReconciliationEngine, Timeouts};
pub use ledger::{RunLedger, MAX_TRACKED_GAP};
pub use outcome::{StopReason, TickOutcome};
pub use ports::{PublishError, PublishReceipt, Publisher, RunObserver, StateError, StateStore};
pub use retry::{OutageBackoff, RetryPolicy};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};

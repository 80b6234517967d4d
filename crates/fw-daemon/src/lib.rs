//! fw-daemon library target.
//!
//! Exposes the orchestrator, router and state for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod orchestrator;
pub mod routes;
pub mod state;

use fw_config::WatcherConfig;
use fw_reconcile::{EngineSettings, RetryPolicy, Timeouts};

/// Engine knobs from the resolved configuration.
pub fn engine_settings(cfg: &WatcherConfig) -> EngineSettings {
    EngineSettings {
        retry: retry_policy(cfg),
        missing_file_grace_ticks: cfg.missing_file_grace_ticks,
        timeouts: Timeouts {
            state: cfg.timeouts.state,
            publish: cfg.timeouts.publish,
            scan: cfg.timeouts.scan,
        },
    }
}

pub fn retry_policy(cfg: &WatcherConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: cfg.retry.max_attempts,
        base_delay: cfg.retry.base_delay,
        max_delay: cfg.retry.max_delay,
    }
}

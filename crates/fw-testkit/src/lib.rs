//! In-memory doubles for the reconciliation ports, plus fixture helpers.
//!
//! Deterministic, no network, no database. Scenario tests under `tests/`
//! drive a real [`fw_reconcile::ReconciliationEngine`] against these.

mod observer;
mod publisher;
mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fw_observe::run_file_name;
use fw_reconcile::{EngineSettings, ReconciliationEngine, RetryPolicy, Timeouts};
use fw_schemas::{Instrument, RunFile};

pub use observer::FakeObserver;
pub use publisher::{FakePublisher, PublishCall};
pub use state::{FailureRow, MemoryStateStore};

/// Instrument rooted at `root` with the MARI naming conventions.
pub fn instrument(id: &str, root: &Path) -> Instrument {
    Instrument {
        id: id.to_string(),
        watch_dir: root.join("data"),
        control_file: root.join("logs").join("lastrun.txt"),
        file_prefix: "MAR".to_string(),
        file_extension: "nxs".to_string(),
        destination: "watched-files".to_string(),
    }
}

/// Run files `MAR<seq>.nxs` under `instrument.watch_dir` (not created on disk).
pub fn run_files(instrument: &Instrument, sequences: impl IntoIterator<Item = i64>) -> Vec<RunFile> {
    sequences
        .into_iter()
        .map(|s| {
            RunFile::new(
                s,
                instrument.watch_dir.join(run_file_name(
                    &instrument.file_prefix,
                    s,
                    5,
                    &instrument.file_extension,
                )),
            )
        })
        .collect()
}

/// Millisecond-scale settings so retry paths finish quickly in tests.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        missing_file_grace_ticks: 2,
        timeouts: Timeouts {
            state: Duration::from_millis(500),
            publish: Duration::from_millis(500),
            scan: Duration::from_millis(500),
        },
    }
}

/// Engine wired to the given doubles.
pub fn engine(
    state: &Arc<MemoryStateStore>,
    publisher: &Arc<FakePublisher>,
    observer: &Arc<FakeObserver>,
    settings: EngineSettings,
) -> ReconciliationEngine {
    ReconciliationEngine::new(state.clone(), publisher.clone(), observer.clone(), settings)
}

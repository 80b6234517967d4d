//! fw-schemas
//!
//! Shared data model for the run-file watcher: instruments, candidate run
//! files, the per-run publish record, persisted watcher state, and the
//! notification handed to the broker.
//!
//! Pure data. No IO.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

/// Static description of one watched instrument.
///
/// Resolved once from configuration and immutable for the lifetime of the
/// watcher process. Passed explicitly through every component call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Identifier used as the state key and in notifications (e.g. `MARI`).
    pub id: String,
    /// Directory holding the instrument's run files.
    pub watch_dir: PathBuf,
    /// Control file recording the instrument's latest run (`lastrun.txt`).
    pub control_file: PathBuf,
    /// Run-file name prefix (e.g. `MAR` for `MAR12345.nxs`).
    pub file_prefix: String,
    /// Run-file extension without the dot.
    pub file_extension: String,
    /// Broker destination the notifications are routed to.
    pub destination: String,
}

// ---------------------------------------------------------------------------
// RunFile
// ---------------------------------------------------------------------------

/// A run file observed on disk, tagged with the sequence number encoded in
/// its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunFile {
    pub sequence: i64,
    pub path: PathBuf,
}

impl RunFile {
    pub fn new(sequence: i64, path: impl Into<PathBuf>) -> Self {
        Self {
            sequence,
            path: path.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PublishStatus
// ---------------------------------------------------------------------------

/// Lifecycle of one run file.
///
/// ```text
/// Discovered -> Pending -> Published
///                  |  \
///                  |   -> Skipped   (terminal)
///                  v
///               Failed -> Pending   (next tick)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishStatus {
    Discovered,
    Pending,
    Published,
    Failed,
    Skipped,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Discovered => "DISCOVERED",
            PublishStatus::Pending => "PENDING",
            PublishStatus::Published => "PUBLISHED",
            PublishStatus::Failed => "FAILED",
            PublishStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DISCOVERED" => Some(PublishStatus::Discovered),
            "PENDING" => Some(PublishStatus::Pending),
            "PUBLISHED" => Some(PublishStatus::Published),
            "FAILED" => Some(PublishStatus::Failed),
            "SKIPPED" => Some(PublishStatus::Skipped),
            _ => None,
        }
    }

    /// `true` once no further publish attempt will be made in this process.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishStatus::Published | PublishStatus::Skipped)
    }

    /// Allowed edges of the lifecycle graph. Self-loops are not transitions.
    pub fn can_transition_to(&self, next: PublishStatus) -> bool {
        use PublishStatus::*;
        matches!(
            (self, next),
            (Discovered, Pending)
                | (Pending, Published)
                | (Pending, Failed)
                | (Pending, Skipped)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunRecord
// ---------------------------------------------------------------------------

/// Rejected lifecycle edge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid run transition for sequence {sequence}: {from} -> {to}")]
pub struct InvalidTransition {
    pub sequence: i64,
    pub from: PublishStatus,
    pub to: PublishStatus,
}

/// Publish bookkeeping for one run file of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub instrument_id: String,
    pub sequence: i64,
    /// `None` while the sequence is known only as a gap (file not listed yet).
    pub path: Option<PathBuf>,
    pub discovered_at: DateTime<Utc>,
    pub status: PublishStatus,
    /// Publish attempts across all ticks.
    pub attempts: u32,
    /// Ticks the file was waited on before the sequence was skipped as missing.
    pub missing_ticks: u32,
    pub last_error: Option<String>,
}

impl RunRecord {
    pub fn discovered(
        instrument_id: impl Into<String>,
        sequence: i64,
        path: Option<PathBuf>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            sequence,
            path,
            discovered_at,
            status: PublishStatus::Discovered,
            attempts: 0,
            missing_ticks: 0,
            last_error: None,
        }
    }

    /// Move along one edge of the lifecycle graph.
    pub fn transition(&mut self, next: PublishStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                sequence: self.sequence,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WatcherState
// ---------------------------------------------------------------------------

/// Persisted per-instrument watermark: the highest sequence confirmed
/// published. Never regresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherState {
    pub instrument_id: String,
    pub last_published_sequence: i64,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Wire payload announcing one run file to the broker.
///
/// Serialized as
/// `{"instrument_id": .., "file_path": .., "sequence": .., "timestamp": <RFC 3339>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub instrument_id: String,
    pub file_path: String,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Build the notification for `run` of `instrument`.
    ///
    /// Returns `None` when the path is not valid UTF-8; such a file cannot be
    /// announced faithfully and is treated as a permanent per-file failure.
    pub fn for_run(instrument: &Instrument, run: &RunFile, timestamp: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            instrument_id: instrument.id.clone(),
            file_path: path_to_string(&run.path)?,
            sequence: run.sequence,
            timestamp,
        })
    }

    /// Stable idempotency key for `(instrument, sequence)`.
    pub fn message_id(&self) -> String {
        format!("{}:{}", self.instrument_id, self.sequence)
    }
}

fn path_to_string(p: &Path) -> Option<String> {
    p.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instrument() -> Instrument {
        Instrument {
            id: "MARI".to_string(),
            watch_dir: PathBuf::from("/archive/NDXMARI/Instrument/data"),
            control_file: PathBuf::from("/archive/NDXMARI/Instrument/logs/lastrun.txt"),
            file_prefix: "MAR".to_string(),
            file_extension: "nxs".to_string(),
            destination: "watched-files".to_string(),
        }
    }

    #[test]
    fn notification_serializes_wire_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let run = RunFile::new(27001, "/archive/NDXMARI/Instrument/data/cycle_23_2/MAR27001.nxs");
        let n = Notification::for_run(&instrument(), &run, ts).unwrap();

        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["instrument_id"], "MARI");
        assert_eq!(v["sequence"], 27001);
        assert_eq!(
            v["file_path"],
            "/archive/NDXMARI/Instrument/data/cycle_23_2/MAR27001.nxs"
        );
        assert_eq!(v["timestamp"], "2024-03-01T12:00:00Z");
        assert_eq!(n.message_id(), "MARI:27001");
    }

    #[test]
    fn lifecycle_edges() {
        use PublishStatus::*;
        assert!(Discovered.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Published));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Skipped));

        assert!(!Published.can_transition_to(Pending));
        assert!(!Skipped.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Published));
        assert!(!Discovered.can_transition_to(Published));
    }

    #[test]
    fn record_rejects_leaving_terminal_state() {
        let mut r = RunRecord::discovered("MARI", 7, None, Utc::now());
        r.transition(PublishStatus::Pending).unwrap();
        r.transition(PublishStatus::Skipped).unwrap();

        let err = r.transition(PublishStatus::Pending).unwrap_err();
        assert_eq!(err.from, PublishStatus::Skipped);
        assert_eq!(r.status, PublishStatus::Skipped);
    }
}

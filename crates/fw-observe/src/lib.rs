//! fw-observe
//!
//! Filesystem view of one instrument: what the control file claims is the
//! latest run, and which run files are actually present in the watched
//! directory.
//!
//! Blocking IO only; callers on an async runtime wrap these calls in
//! `spawn_blocking`.

mod control;
mod naming;
mod scan;

use std::path::PathBuf;

pub use control::{parse_control_line, read_control_file, ControlRecord};
pub use naming::{parse_run_file_name, run_file_name};
pub use scan::{list_run_files, DirectoryObserver, ScanReport, DEFAULT_SCAN_DEPTH};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserveError {
    /// Watched directory missing or unreadable. The tick cannot proceed.
    #[error("directory unavailable {path}: {reason}")]
    DirectoryUnavailable { path: PathBuf, reason: String },

    /// Control file missing, unreadable or malformed. Callers fall back to
    /// directory listing alone.
    #[error("control file corrupt {path}: {reason}")]
    ControlFileCorrupt { path: PathBuf, reason: String },
}

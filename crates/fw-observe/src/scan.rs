use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use fw_schemas::{Instrument, RunFile};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::control::read_control_file;
use crate::naming::parse_run_file_name;
use crate::ObserveError;

/// Watched directory plus one level of cycle folders (`cycle_23_2/`).
pub const DEFAULT_SCAN_DEPTH: usize = 2;

/// One observation of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Run files, strictly ascending by sequence, one per sequence.
    pub candidates: Vec<RunFile>,
    /// Latest run according to the control file. `None` in degraded mode.
    pub control_sequence: Option<i64>,
    /// Run files found on disk before capping at the control sequence.
    pub listed: usize,
}

impl ScanReport {
    pub fn degraded(&self) -> bool {
        self.control_sequence.is_none()
    }

    pub fn highest_sequence(&self) -> Option<i64> {
        self.candidates.last().map(|r| r.sequence)
    }
}

/// List run files under `instrument.watch_dir`, ascending by sequence.
///
/// When two paths carry the same sequence number the lexicographically
/// greatest path is kept (the most recent cycle folder).
pub fn list_run_files(instrument: &Instrument, max_depth: usize) -> Result<Vec<RunFile>, ObserveError> {
    let dir = &instrument.watch_dir;
    let unavailable = |reason: String| ObserveError::DirectoryUnavailable {
        path: dir.clone(),
        reason,
    };

    let meta = fs::metadata(dir).map_err(|e| unavailable(e.to_string()))?;
    if !meta.is_dir() {
        return Err(unavailable("not a directory".to_string()));
    }

    let mut by_sequence: BTreeMap<i64, PathBuf> = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth.max(1)) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                // A failure on the root itself means nothing can be listed.
                if e.depth() == 0 {
                    return Err(unavailable(e.to_string()));
                }
                warn!(instrument = %instrument.id, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(sequence) =
            parse_run_file_name(name, &instrument.file_prefix, &instrument.file_extension)
        else {
            continue;
        };

        let path = entry.into_path();
        let keep_existing = by_sequence
            .get(&sequence)
            .is_some_and(|existing| *existing >= path);
        if !keep_existing {
            by_sequence.insert(sequence, path);
        }
    }

    Ok(by_sequence
        .into_iter()
        .map(|(sequence, path)| RunFile { sequence, path })
        .collect())
}

/// Observer over the real filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryObserver {
    scan_depth: usize,
}

impl Default for DirectoryObserver {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_DEPTH)
    }
}

impl DirectoryObserver {
    pub fn new(scan_depth: usize) -> Self {
        Self { scan_depth }
    }

    /// Control file first, then the directory listing capped at the control
    /// sequence.
    ///
    /// A corrupt control file is returned as an error so the caller decides
    /// whether to fall back to [`DirectoryObserver::list`].
    pub fn scan(&self, instrument: &Instrument) -> Result<ScanReport, ObserveError> {
        let control = read_control_file(&instrument.control_file)?;
        let listed = self.list(instrument)?;
        let total = listed.len();

        let candidates: Vec<RunFile> = listed
            .into_iter()
            .filter(|r| r.sequence <= control.sequence)
            .collect();

        if candidates.last().map(|r| r.sequence) != Some(control.sequence) {
            debug!(
                instrument = %instrument.id,
                control_sequence = control.sequence,
                "control file ahead of directory listing"
            );
        }

        Ok(ScanReport {
            candidates,
            control_sequence: Some(control.sequence),
            listed: total,
        })
    }

    /// Directory listing alone (degraded mode).
    pub fn list(&self, instrument: &Instrument) -> Result<Vec<RunFile>, ObserveError> {
        list_run_files(instrument, self.scan_depth)
    }
}

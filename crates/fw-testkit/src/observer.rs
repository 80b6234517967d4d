use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fw_observe::{ObserveError, ScanReport};
use fw_reconcile::RunObserver;
use fw_schemas::{Instrument, RunFile};

#[derive(Debug, Default)]
struct Inner {
    files: Vec<RunFile>,
    control_sequence: Option<i64>,
    control_corrupt: bool,
    directory_error: Option<String>,
    scans: usize,
}

/// Scripted directory view. Behaves like the filesystem observer: the scan
/// is capped at the control sequence and a corrupt control file is reported
/// as `ControlFileCorrupt`.
#[derive(Debug, Default)]
pub struct FakeObserver {
    inner: Mutex<Inner>,
}

impl FakeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the listing. The control file follows the newest run unless
    /// set explicitly afterwards.
    pub fn set_files(&self, files: Vec<RunFile>) {
        let mut inner = self.lock();
        inner.control_sequence = files.iter().map(|f| f.sequence).max();
        inner.files = files;
    }

    pub fn set_control(&self, sequence: Option<i64>) {
        self.lock().control_sequence = sequence;
    }

    pub fn set_control_corrupt(&self, corrupt: bool) {
        self.lock().control_corrupt = corrupt;
    }

    pub fn set_directory_error(&self, reason: Option<&str>) {
        self.lock().directory_error = reason.map(str::to_string);
    }

    /// Number of `scan` calls so far.
    pub fn scans(&self) -> usize {
        self.lock().scans
    }
}

#[async_trait]
impl RunObserver for FakeObserver {
    async fn scan(&self, instrument: &Instrument) -> Result<ScanReport, ObserveError> {
        let mut inner = self.lock();
        inner.scans += 1;

        if inner.control_corrupt {
            return Err(ObserveError::ControlFileCorrupt {
                path: instrument.control_file.clone(),
                reason: "scripted corruption".to_string(),
            });
        }
        let Some(control) = inner.control_sequence else {
            return Err(ObserveError::ControlFileCorrupt {
                path: instrument.control_file.clone(),
                reason: "no control file".to_string(),
            });
        };
        if let Some(reason) = &inner.directory_error {
            return Err(ObserveError::DirectoryUnavailable {
                path: instrument.watch_dir.clone(),
                reason: reason.clone(),
            });
        }

        let mut candidates: Vec<RunFile> = inner
            .files
            .iter()
            .filter(|f| f.sequence <= control)
            .cloned()
            .collect();
        candidates.sort();
        Ok(ScanReport {
            listed: inner.files.len(),
            candidates,
            control_sequence: Some(control),
        })
    }

    async fn list(&self, instrument: &Instrument) -> Result<Vec<RunFile>, ObserveError> {
        let inner = self.lock();
        if let Some(reason) = &inner.directory_error {
            return Err(ObserveError::DirectoryUnavailable {
                path: instrument.watch_dir.clone(),
                reason: reason.clone(),
            });
        }
        let mut files = inner.files.clone();
        files.sort();
        Ok(files)
    }
}

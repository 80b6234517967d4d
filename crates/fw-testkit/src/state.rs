use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fw_reconcile::{StateError, StateStore};
use fw_schemas::PublishStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRow {
    pub instrument_id: String,
    pub sequence: i64,
    pub status: PublishStatus,
    pub reason: String,
}

#[derive(Debug, Default)]
struct Inner {
    watermarks: BTreeMap<String, i64>,
    failures: Vec<FailureRow>,
    unavailable: bool,
    failing_audits: bool,
    failing_commits: u32,
    commits: Vec<(String, i64)>,
}

/// Forward-only watermark store with a switchable outage.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Inner>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(instrument_id: &str, sequence: i64) -> Self {
        let store = Self::default();
        store
            .lock()
            .watermarks
            .insert(instrument_id.to_string(), sequence);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the state from assertions.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every call fails with `Unavailable` while set.
    pub fn set_unavailable(&self, down: bool) {
        self.lock().unavailable = down;
    }

    /// `record_failure` fails while set; reads and commits are unaffected.
    pub fn fail_audits(&self, failing: bool) {
        self.lock().failing_audits = failing;
    }

    /// The next `n` `set_last_published` calls fail.
    pub fn fail_next_commits(&self, n: u32) {
        self.lock().failing_commits = n;
    }

    pub fn watermark(&self, instrument_id: &str) -> Option<i64> {
        self.lock().watermarks.get(instrument_id).copied()
    }

    pub fn failures(&self) -> Vec<FailureRow> {
        self.lock().failures.clone()
    }

    /// Successful `set_last_published` calls, in order.
    pub fn commits(&self) -> Vec<(String, i64)> {
        self.lock().commits.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_last_published(&self, instrument_id: &str) -> Result<Option<i64>, StateError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(StateError::Unavailable("memory store down".to_string()));
        }
        Ok(inner.watermarks.get(instrument_id).copied())
    }

    async fn set_last_published(&self, instrument_id: &str, sequence: i64) -> Result<bool, StateError> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(StateError::Unavailable("memory store down".to_string()));
        }
        if inner.failing_commits > 0 {
            inner.failing_commits -= 1;
            return Err(StateError::Unavailable("injected commit failure".to_string()));
        }

        let current = inner.watermarks.get(instrument_id).copied();
        if current.is_some_and(|c| c >= sequence) {
            return Ok(false);
        }
        inner
            .watermarks
            .insert(instrument_id.to_string(), sequence);
        inner.commits.push((instrument_id.to_string(), sequence));
        Ok(true)
    }

    async fn record_failure(
        &self,
        instrument_id: &str,
        sequence: i64,
        status: PublishStatus,
        reason: &str,
    ) -> Result<(), StateError> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(StateError::Unavailable("memory store down".to_string()));
        }
        if inner.failing_audits {
            return Err(StateError::Unavailable("injected audit failure".to_string()));
        }
        inner.failures.push(FailureRow {
            instrument_id: instrument_id.to_string(),
            sequence,
            status,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

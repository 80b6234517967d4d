use serde::Serialize;

/// Why a tick stopped before working through every pending run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// State store unreachable; nothing was published.
    StateUnavailable { reason: String },
    /// Watched directory unreadable; nothing was published.
    ObserverFailed { reason: String },
    /// Retryable publish failure persisted through every attempt.
    RetriesExhausted { sequence: i64, reason: String },
    /// A sequence is missing from the listing and its grace period runs on.
    WaitingForFile { sequence: i64 },
    /// Neither the state store nor the filesystem yields a baseline yet.
    NoBaseline,
    Shutdown,
}

/// Summary of one reconciliation tick for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickOutcome {
    pub instrument_id: String,
    pub last_published_before: Option<i64>,
    pub last_published_after: Option<i64>,
    /// Set when this tick seeded a missing watermark.
    pub initialized: Option<i64>,
    pub published: Vec<i64>,
    pub skipped: Vec<i64>,
    pub failed: Option<i64>,
    /// More than one run was pending at the start of the tick.
    pub recovery: bool,
    /// The control file was unusable; candidates came from the listing alone.
    pub degraded: bool,
    pub stop: Option<StopReason>,
}

impl TickOutcome {
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            last_published_before: None,
            last_published_after: None,
            initialized: None,
            published: Vec::new(),
            skipped: Vec::new(),
            failed: None,
            recovery: false,
            degraded: false,
            stop: None,
        }
    }

    pub fn state_unavailable(&self) -> bool {
        matches!(self.stop, Some(StopReason::StateUnavailable { .. }))
    }

    pub fn is_clean(&self) -> bool {
        self.stop.is_none() && self.failed.is_none() && self.skipped.is_empty()
    }

    /// Short label for status reporting.
    pub fn label(&self) -> &'static str {
        match &self.stop {
            None if self.skipped.is_empty() => "ok",
            None => "skipped",
            Some(StopReason::StateUnavailable { .. }) => "state_unavailable",
            Some(StopReason::ObserverFailed { .. }) => "observer_failed",
            Some(StopReason::RetriesExhausted { .. }) => "retries_exhausted",
            Some(StopReason::WaitingForFile { .. }) => "waiting_for_file",
            Some(StopReason::NoBaseline) => "no_baseline",
            Some(StopReason::Shutdown) => "shutdown",
        }
    }
}

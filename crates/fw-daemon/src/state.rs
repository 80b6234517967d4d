//! Shared runtime state for fw-daemon.
//!
//! Written by the instrument loops after every tick, read by the HTTP
//! handlers. Handlers receive `State<Arc<AppState>>` from Axum.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fw_reconcile::TickOutcome;
use serde::Serialize;
use tokio::sync::RwLock;

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Last known state of one instrument loop.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct InstrumentStatus {
    pub instrument_id: String,
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Short label of the last tick's outcome (`ok`, `state_unavailable`, ...).
    pub last_outcome: Option<String>,
    pub last_published: Option<i64>,
    /// Set while the loop is backing off after a state store outage.
    pub paused_until: Option<DateTime<Utc>>,
    pub degraded: bool,
    pub last_failed: Option<i64>,
    pub published_total: u64,
    pub skipped_total: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    instruments: Arc<RwLock<BTreeMap<String, InstrumentStatus>>>,
}

impl AppState {
    pub fn new<'a>(instrument_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let instruments = instrument_ids
            .into_iter()
            .map(|id| {
                (
                    id.to_string(),
                    InstrumentStatus {
                        instrument_id: id.to_string(),
                        ..InstrumentStatus::default()
                    },
                )
            })
            .collect();

        Self {
            build: BuildInfo {
                service: "fw-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            instruments: Arc::new(RwLock::new(instruments)),
        }
    }

    pub async fn record_tick(&self, outcome: &TickOutcome, at: DateTime<Utc>) {
        let mut map = self.instruments.write().await;
        let entry = map
            .entry(outcome.instrument_id.clone())
            .or_insert_with(|| InstrumentStatus {
                instrument_id: outcome.instrument_id.clone(),
                ..InstrumentStatus::default()
            });

        entry.last_tick_at = Some(at);
        entry.last_outcome = Some(outcome.label().to_string());
        if outcome.last_published_after.is_some() {
            entry.last_published = outcome.last_published_after;
        }
        // An aborted tick never observed the directory; keep the last view.
        if !outcome.state_unavailable() {
            entry.degraded = outcome.degraded;
        }
        entry.last_failed = outcome.failed;
        entry.published_total += outcome.published.len() as u64;
        entry.skipped_total += outcome.skipped.len() as u64;
    }

    pub async fn set_paused_until(&self, instrument_id: &str, until: Option<DateTime<Utc>>) {
        if let Some(entry) = self.instruments.write().await.get_mut(instrument_id) {
            entry.paused_until = until;
        }
    }

    pub async fn snapshot(&self) -> Vec<InstrumentStatus> {
        self.instruments.read().await.values().cloned().collect()
    }

    pub async fn instrument(&self, instrument_id: &str) -> Option<InstrumentStatus> {
        self.instruments.read().await.get(instrument_id).cloned()
    }
}

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

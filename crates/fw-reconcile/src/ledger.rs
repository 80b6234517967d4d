//! In-process publish ledger for one instrument.
//!
//! Remembers what this process already did with each sequence above the
//! persisted watermark so a tick never re-publishes a run it has published
//! (commit still pending) or skipped. Lost on restart by construction: the
//! persisted watermark is the only durable truth.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fw_schemas::{PublishStatus, RunFile, RunRecord};
use tracing::error;

/// Gaps wider than this are skipped as a single audited range instead of
/// one record per sequence.
pub const MAX_TRACKED_GAP: i64 = 1024;

#[derive(Debug, Clone, Default)]
pub struct RunLedger {
    instrument_id: String,
    records: BTreeMap<i64, RunRecord>,
    /// Gap start -> ticks it has been observed missing.
    waiting_gaps: BTreeMap<i64, u32>,
    /// Inclusive ranges given up on.
    skipped_gaps: Vec<(i64, i64)>,
}

impl RunLedger {
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, sequence: i64) -> Option<&RunRecord> {
        self.records.get(&sequence)
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.values()
    }

    pub fn status(&self, sequence: i64) -> Option<PublishStatus> {
        self.records.get(&sequence).map(|r| r.status)
    }

    /// Record `run` as discovered if unseen, refreshing the path otherwise.
    pub fn observe_run(&mut self, run: &RunFile, now: DateTime<Utc>) -> &mut RunRecord {
        let id = &self.instrument_id;
        let rec = self
            .records
            .entry(run.sequence)
            .or_insert_with(|| RunRecord::discovered(id.clone(), run.sequence, None, now));
        rec.path = Some(run.path.clone());
        rec
    }

    /// Apply a lifecycle edge. Invalid edges are logged and ignored.
    pub fn mark(&mut self, sequence: i64, next: PublishStatus) -> bool {
        let Some(rec) = self.records.get_mut(&sequence) else {
            return false;
        };
        if rec.status == next {
            return true;
        }
        match rec.transition(next) {
            Ok(()) => true,
            Err(e) => {
                error!(instrument = %self.instrument_id, error = %e, "run ledger rejected transition");
                false
            }
        }
    }

    pub fn note_attempt(&mut self, sequence: i64, error: Option<&str>) {
        if let Some(rec) = self.records.get_mut(&sequence) {
            rec.attempts = rec.attempts.saturating_add(1);
            rec.last_error = error.map(str::to_string);
        }
    }

    /// `true` when the sequence was skipped, individually or within a gap.
    pub fn is_skipped(&self, sequence: i64) -> bool {
        self.status(sequence) == Some(PublishStatus::Skipped)
            || self
                .skipped_gaps
                .iter()
                .any(|&(start, end)| start <= sequence && sequence <= end)
    }

    /// Count one more missing tick for each gap in `gaps`; returns the counts
    /// in the same order. Gaps no longer present are forgotten.
    pub fn observe_gaps(&mut self, gaps: &[(i64, i64)]) -> Vec<u32> {
        self.waiting_gaps
            .retain(|start, _| gaps.iter().any(|(s, _)| s == start));

        let mut counts = Vec::with_capacity(gaps.len());
        for &(start, end) in gaps {
            if self.is_gap_skipped(start, end) {
                counts.push(0);
                continue;
            }
            let ticks = self.waiting_gaps.entry(start).or_insert(0);
            *ticks = ticks.saturating_add(1);
            counts.push(*ticks);
        }
        counts
    }

    pub fn is_gap_skipped(&self, start: i64, end: i64) -> bool {
        if self
            .skipped_gaps
            .iter()
            .any(|&(s, e)| s <= start && end <= e)
        {
            return true;
        }
        end - start < MAX_TRACKED_GAP && (start..=end).all(|s| self.is_skipped(s))
    }

    /// Give up on a gap. Sequences are materialized as `Skipped` records,
    /// carrying the ticks waited, when the range is at most
    /// [`MAX_TRACKED_GAP`] long.
    pub fn skip_gap(&mut self, start: i64, end: i64, reason: &str, now: DateTime<Utc>) {
        let waited = self.waiting_gaps.remove(&start).unwrap_or(0);
        self.skipped_gaps.push((start, end));

        if end - start + 1 > MAX_TRACKED_GAP {
            return;
        }
        for sequence in start..=end {
            let rec = self.records.entry(sequence).or_insert_with(|| {
                RunRecord::discovered(self.instrument_id.clone(), sequence, None, now)
            });
            rec.status = PublishStatus::Skipped;
            rec.missing_ticks = waited;
            rec.last_error = Some(reason.to_string());
        }
    }

    /// Forget everything at or below the persisted watermark.
    pub fn prune_through(&mut self, last_published: i64) {
        self.records = self.records.split_off(&last_published.saturating_add(1));
        self.waiting_gaps = self.waiting_gaps.split_off(&last_published.saturating_add(1));
        self.skipped_gaps.retain(|&(_, end)| end > last_published);
    }

    /// Sequences published by this process whose watermark commit is still
    /// outstanding.
    pub fn uncommitted(&self) -> Vec<i64> {
        self.records
            .values()
            .filter(|r| r.status == PublishStatus::Published)
            .map(|r| r.sequence)
            .collect()
    }

    pub fn path_of(&self, sequence: i64) -> Option<PathBuf> {
        self.records.get(&sequence).and_then(|r| r.path.clone())
    }
}

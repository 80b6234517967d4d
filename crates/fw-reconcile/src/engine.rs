//! One reconciliation tick for one instrument.
//!
//! ```text
//! state store ──► watermark ─┐
//!                            ├─► plan (runs + gaps above watermark, ascending)
//! observer ───► candidates ──┘        │
//!                                     ▼
//!                 publish ─► confirm ─► commit watermark ─► next run
//! ```
//!
//! Stop conditions (tick ends, remaining runs wait for the next tick):
//! state outage, unreadable directory, exhausted retryable publish, a gap
//! still inside its grace period, shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fw_observe::{ObserveError, ScanReport};
use fw_schemas::{Instrument, Notification, PublishStatus, RunFile};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::ledger::{RunLedger, MAX_TRACKED_GAP};
use crate::outcome::{StopReason, TickOutcome};
use crate::ports::{PublishError, PublishReceipt, Publisher, RunObserver, StateError, StateStore};
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;

/// Upper bounds on every dependency call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub state: Duration,
    pub publish: Duration,
    pub scan: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            state: Duration::from_secs(5),
            publish: Duration::from_secs(10),
            scan: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub retry: RetryPolicy,
    /// Ticks a missing sequence is waited on before it is skipped.
    pub missing_file_grace_ticks: u32,
    pub timeouts: Timeouts,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            missing_file_grace_ticks: 30,
            timeouts: Timeouts::default(),
        }
    }
}

/// Mutable per-instrument state owned by that instrument's loop.
#[derive(Debug, Clone)]
pub struct InstrumentContext {
    pub instrument: Instrument,
    pub ledger: RunLedger,
}

impl InstrumentContext {
    pub fn new(instrument: Instrument) -> Self {
        let ledger = RunLedger::new(instrument.id.clone());
        Self { instrument, ledger }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Run(RunFile),
    Gap { start: i64, end: i64 },
}

/// Everything strictly above `last`, ascending, with absent sequences
/// between candidates reported as gaps.
fn plan(last: i64, candidates: &[RunFile]) -> Vec<Step> {
    let ordered: BTreeMap<i64, &RunFile> = candidates
        .iter()
        .filter(|r| r.sequence > last)
        .map(|r| (r.sequence, r))
        .collect();

    let mut steps = Vec::with_capacity(ordered.len());
    let mut next = last.saturating_add(1);
    for (sequence, run) in ordered {
        if sequence > next {
            steps.push(Step::Gap {
                start: next,
                end: sequence - 1,
            });
        }
        steps.push(Step::Run(run.clone()));
        next = sequence.saturating_add(1);
    }
    steps
}

enum PublishFailure {
    Permanent(String),
    Exhausted { attempts: u32, reason: String },
    Interrupted(String),
}

enum RunResult {
    /// Carry on with the (possibly advanced) watermark.
    Continue(i64),
    Stop(StopReason),
}

/// Drives detection and recovery for any number of instruments.
///
/// Holds no per-instrument state; callers own one [`InstrumentContext`] per
/// instrument and never run two ticks for the same context concurrently.
pub struct ReconciliationEngine {
    state: Arc<dyn StateStore>,
    publisher: Arc<dyn Publisher>,
    observer: Arc<dyn RunObserver>,
    settings: EngineSettings,
}

impl ReconciliationEngine {
    pub fn new(
        state: Arc<dyn StateStore>,
        publisher: Arc<dyn Publisher>,
        observer: Arc<dyn RunObserver>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            state,
            publisher,
            observer,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one reconciliation pass for `ctx.instrument`.
    ///
    /// Never panics on dependency failure; every failure is folded into the
    /// returned outcome.
    pub async fn tick(&self, ctx: &mut InstrumentContext, shutdown: &ShutdownSignal) -> TickOutcome {
        let id = ctx.instrument.id.clone();
        let mut out = TickOutcome::new(id.clone());

        // Watermark first. An outage here must not look like "no state".
        let last = match self.read_state(&id).await {
            Ok(v) => v,
            Err(e) => {
                warn!(instrument = %id, error = %e, "state store unavailable; tick aborted");
                out.stop = Some(StopReason::StateUnavailable {
                    reason: e.to_string(),
                });
                return out;
            }
        };
        out.last_published_before = last;
        out.last_published_after = last;

        let report = match self.observe(&ctx.instrument).await {
            Ok(r) => r,
            Err(e) => {
                error!(instrument = %id, error = %e, "observation failed; tick aborted");
                out.stop = Some(StopReason::ObserverFailed {
                    reason: e.to_string(),
                });
                return out;
            }
        };
        out.degraded = report.degraded();

        let Some(mut last) = last else {
            self.initialize(&id, &report, &mut out).await;
            return out;
        };
        ctx.ledger.prune_through(last);

        let steps = plan(last, &report.candidates);
        if steps.is_empty() {
            debug!(instrument = %id, last_published = last, "up to date");
            return out;
        }

        let gaps: Vec<(i64, i64)> = steps
            .iter()
            .filter_map(|s| match s {
                Step::Gap { start, end } => Some((*start, *end)),
                Step::Run(_) => None,
            })
            .collect();
        let mut gap_ticks = ctx.ledger.observe_gaps(&gaps).into_iter();

        let pending = steps
            .iter()
            .filter(|s| matches!(s, Step::Run(r) if !ctx.ledger.is_skipped(r.sequence)))
            .count();
        if pending > 1 {
            out.recovery = true;
            warn!(
                instrument = %id,
                pending,
                last_published = last,
                highest = report.highest_sequence().unwrap_or(last),
                "missed files detected; recovering in order"
            );
        }

        for step in steps {
            if shutdown.is_requested() {
                info!(instrument = %id, "shutdown requested; stopping at run boundary");
                out.stop = Some(StopReason::Shutdown);
                break;
            }

            match step {
                Step::Gap { start, end } => {
                    let ticks = gap_ticks.next().unwrap_or(0);
                    if ctx.ledger.is_gap_skipped(start, end) {
                        continue;
                    }
                    if ticks <= self.settings.missing_file_grace_ticks {
                        info!(
                            instrument = %id,
                            sequence = start,
                            missing_ticks = ticks,
                            grace_ticks = self.settings.missing_file_grace_ticks,
                            "run file missing from listing; waiting"
                        );
                        out.stop = Some(StopReason::WaitingForFile { sequence: start });
                        break;
                    }
                    self.skip_gap(ctx, start, end, &mut out).await;
                }
                Step::Run(run) => match self.process_run(ctx, &run, last, shutdown, &mut out).await {
                    RunResult::Continue(advanced) => last = advanced,
                    RunResult::Stop(reason) => {
                        out.stop = Some(reason);
                        break;
                    }
                },
            }
        }

        out.last_published_after = Some(last);
        if out.stop.is_none() && shutdown.is_requested() {
            out.stop = Some(StopReason::Shutdown);
        }
        if out.recovery && !out.published.is_empty() {
            warn!(
                instrument = %id,
                published = out.published.len(),
                last_published = last,
                "missed files recovered"
            );
        }
        out
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn initialize(
        &self,
        id: &str,
        report: &ScanReport,
        out: &mut TickOutcome,
    ) {
        let Some(baseline) = report.control_sequence.or(report.highest_sequence()) else {
            info!(instrument = %id, "no watcher state and nothing to seed it from yet");
            out.stop = Some(StopReason::NoBaseline);
            return;
        };

        match self.commit(id, baseline).await {
            Ok(_) => {
                info!(
                    instrument = %id,
                    sequence = baseline,
                    degraded = out.degraded,
                    "watcher state initialized; earlier runs are not announced"
                );
                out.initialized = Some(baseline);
                out.last_published_after = Some(baseline);
            }
            Err(e) => {
                warn!(instrument = %id, error = %e, "could not initialize watcher state");
                out.stop = Some(StopReason::StateUnavailable {
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn process_run(
        &self,
        ctx: &mut InstrumentContext,
        run: &RunFile,
        last: i64,
        shutdown: &ShutdownSignal,
        out: &mut TickOutcome,
    ) -> RunResult {
        let id = ctx.instrument.id.clone();
        let sequence = run.sequence;

        if ctx.ledger.is_skipped(sequence) {
            debug!(instrument = %id, sequence, "run skipped earlier in this process");
            return RunResult::Continue(last);
        }

        let now = Utc::now();
        let status = ctx.ledger.observe_run(run, now).status;

        if status == PublishStatus::Published {
            debug!(instrument = %id, sequence, "run already published; committing watermark only");
        } else {
            ctx.ledger.mark(sequence, PublishStatus::Pending);

            let Some(notification) = Notification::for_run(&ctx.instrument, run, now) else {
                self.skip_run(ctx, sequence, "file path is not valid UTF-8", out)
                    .await;
                return RunResult::Continue(last);
            };

            match self.publish_with_retry(ctx, &notification, shutdown).await {
                Ok(receipt) => {
                    ctx.ledger.mark(sequence, PublishStatus::Published);
                    out.published.push(sequence);
                    info!(
                        instrument = %id,
                        sequence,
                        path = %notification.file_path,
                        message_id = %receipt.message_id,
                        "run published"
                    );
                }
                Err(PublishFailure::Permanent(reason)) => {
                    self.skip_run(ctx, sequence, &reason, out).await;
                    return RunResult::Continue(last);
                }
                Err(PublishFailure::Exhausted { attempts, reason }) => {
                    ctx.ledger.mark(sequence, PublishStatus::Failed);
                    error!(
                        instrument = %id,
                        sequence,
                        attempts,
                        reason = %reason,
                        "publish retries exhausted; later runs held back until next tick"
                    );
                    self.audit(&id, sequence, PublishStatus::Failed, &reason)
                        .await;
                    out.failed = Some(sequence);
                    return RunResult::Stop(StopReason::RetriesExhausted { sequence, reason });
                }
                Err(PublishFailure::Interrupted(reason)) => {
                    ctx.ledger.mark(sequence, PublishStatus::Failed);
                    info!(
                        instrument = %id,
                        sequence,
                        reason = %reason,
                        "publish retry interrupted by shutdown"
                    );
                    return RunResult::Stop(StopReason::Shutdown);
                }
            }
        }

        match self.commit(&id, sequence).await {
            Ok(advanced) => {
                if !advanced {
                    debug!(instrument = %id, sequence, "watermark already at or beyond run");
                }
                RunResult::Continue(last.max(sequence))
            }
            Err(e) => {
                error!(
                    instrument = %id,
                    sequence,
                    error = %e,
                    "watermark commit failed after publish; will re-commit next tick"
                );
                RunResult::Stop(StopReason::StateUnavailable {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn skip_run(
        &self,
        ctx: &mut InstrumentContext,
        sequence: i64,
        reason: &str,
        out: &mut TickOutcome,
    ) {
        ctx.ledger.note_attempt(sequence, Some(reason));
        ctx.ledger.mark(sequence, PublishStatus::Skipped);
        error!(
            instrument = %ctx.instrument.id,
            sequence,
            path = ?ctx.ledger.path_of(sequence),
            reason = %reason,
            "run skipped after permanent failure"
        );
        self.audit(&ctx.instrument.id, sequence, PublishStatus::Skipped, reason)
            .await;
        out.skipped.push(sequence);
    }

    async fn skip_gap(&self, ctx: &mut InstrumentContext, start: i64, end: i64, out: &mut TickOutcome) {
        let id = ctx.instrument.id.clone();
        let grace = self.settings.missing_file_grace_ticks;
        let reason = format!("run file never appeared after {grace} ticks");
        ctx.ledger
            .skip_gap(start, end, &reason, Utc::now());

        error!(
            instrument = %id,
            from = start,
            to = end,
            grace_ticks = grace,
            "missing run files skipped"
        );

        if end - start + 1 > MAX_TRACKED_GAP {
            let reason = format!("runs {start}..={end} never appeared after {grace} ticks");
            self.audit(&id, start, PublishStatus::Skipped, &reason).await;
            out.skipped.push(start);
            return;
        }
        for sequence in start..=end {
            self.audit(&id, sequence, PublishStatus::Skipped, &reason)
                .await;
            out.skipped.push(sequence);
        }
    }

    // -----------------------------------------------------------------------
    // Dependency calls
    // -----------------------------------------------------------------------

    async fn read_state(&self, id: &str) -> Result<Option<i64>, StateError> {
        timeout(self.settings.timeouts.state, self.state.get_last_published(id))
            .await
            .map_err(|_| StateError::Timeout)?
    }

    /// Control file plus listing, falling back to the listing alone when the
    /// control file is unusable.
    async fn observe(&self, instrument: &Instrument) -> Result<ScanReport, ObserveError> {
        let limit = self.settings.timeouts.scan;
        let timed_out = || ObserveError::DirectoryUnavailable {
            path: instrument.watch_dir.clone(),
            reason: format!("scan timed out after {limit:?}"),
        };

        match timeout(limit, self.observer.scan(instrument)).await {
            Err(_) => Err(timed_out()),
            Ok(Ok(report)) => Ok(report),
            Ok(Err(ObserveError::ControlFileCorrupt { path, reason })) => {
                warn!(
                    instrument = %instrument.id,
                    path = %path.display(),
                    reason = %reason,
                    "control file unusable; degraded to directory listing"
                );
                let candidates = timeout(limit, self.observer.list(instrument))
                    .await
                    .map_err(|_| timed_out())??;
                Ok(ScanReport {
                    listed: candidates.len(),
                    candidates,
                    control_sequence: None,
                })
            }
            Ok(Err(e)) => Err(e),
        }
    }

    async fn publish_with_retry(
        &self,
        ctx: &mut InstrumentContext,
        notification: &Notification,
        shutdown: &ShutdownSignal,
    ) -> Result<PublishReceipt, PublishFailure> {
        let policy = self.settings.retry;
        let limit = self.settings.timeouts.publish;
        let max_attempts = policy.attempts();
        let sequence = notification.sequence;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match timeout(
                limit,
                self.publisher
                    .publish(&ctx.instrument.destination, notification),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(PublishError::Retryable(format!(
                    "publish timed out after {limit:?}"
                ))),
            };

            let reason = match result {
                Ok(receipt) => {
                    ctx.ledger.note_attempt(sequence, None);
                    return Ok(receipt);
                }
                Err(PublishError::Permanent(reason)) => {
                    ctx.ledger.note_attempt(sequence, Some(&reason));
                    return Err(PublishFailure::Permanent(reason));
                }
                Err(PublishError::Retryable(reason)) => reason,
            };

            ctx.ledger.note_attempt(sequence, Some(&reason));
            if attempt >= max_attempts {
                return Err(PublishFailure::Exhausted {
                    attempts: attempt,
                    reason,
                });
            }

            let delay = policy.delay_for_attempt(attempt - 1);
            warn!(
                instrument = %notification.instrument_id,
                sequence,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "publish failed; retrying"
            );
            if !shutdown.sleep(delay).await {
                return Err(PublishFailure::Interrupted(reason));
            }
        }
    }

    /// Raise the watermark, retrying with the same backoff as publishing.
    ///
    /// Spends the whole retry budget even after shutdown is requested; a
    /// confirmed publish always gets its commit attempts.
    async fn commit(&self, id: &str, sequence: i64) -> Result<bool, StateError> {
        let policy = self.settings.retry;
        let max_attempts = policy.attempts();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match timeout(
                self.settings.timeouts.state,
                self.state.set_last_published(id, sequence),
            )
            .await
            {
                Ok(Ok(advanced)) => return Ok(advanced),
                Ok(Err(e)) => e,
                Err(_) => StateError::Timeout,
            };

            if attempt >= max_attempts {
                return Err(err);
            }
            let delay = policy.delay_for_attempt(attempt - 1);
            warn!(
                instrument = %id,
                sequence,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "watermark commit failed; retrying"
            );
            sleep(delay).await;
        }
    }

    /// Best effort: an audit failure never changes the tick's course.
    async fn audit(&self, id: &str, sequence: i64, status: PublishStatus, reason: &str) {
        let call = self.state.record_failure(id, sequence, status, reason);
        match timeout(self.settings.timeouts.state, call).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(instrument = %id, sequence, error = %e, "failure audit not recorded")
            }
            Err(_) => warn!(instrument = %id, sequence, "failure audit timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(seqs: &[i64]) -> Vec<RunFile> {
        seqs.iter()
            .map(|s| RunFile::new(*s, format!("/data/MAR{s}.nxs")))
            .collect()
    }

    fn sequences(steps: &[Step]) -> Vec<String> {
        steps
            .iter()
            .map(|s| match s {
                Step::Run(r) => r.sequence.to_string(),
                Step::Gap { start, end } => format!("gap {start}-{end}"),
            })
            .collect()
    }

    #[test]
    fn plan_only_covers_runs_above_watermark() {
        let steps = plan(5, &runs(&[3, 4, 5, 6, 7]));
        assert_eq!(sequences(&steps), vec!["6", "7"]);
    }

    #[test]
    fn plan_reports_gaps_in_order() {
        let steps = plan(5, &runs(&[6, 9, 12]));
        assert_eq!(
            sequences(&steps),
            vec!["6", "gap 7-8", "9", "gap 10-11", "12"]
        );
    }

    #[test]
    fn plan_sorts_and_dedupes_unordered_candidates() {
        let steps = plan(0, &runs(&[3, 1, 2, 2]));
        assert_eq!(sequences(&steps), vec!["1", "2", "3"]);
    }

    #[test]
    fn plan_gap_right_after_watermark() {
        let steps = plan(5, &runs(&[8]));
        assert_eq!(sequences(&steps), vec!["gap 6-7", "8"]);
    }
}

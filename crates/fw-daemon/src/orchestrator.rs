//! Per-instrument tick loops.
//!
//! One tokio task per instrument. A loop never overlaps its own ticks
//! (`MissedTickBehavior::Skip`) and instruments never block each other.
//! After a state store outage the instrument pauses with exponential
//! backoff until the store answers again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fw_reconcile::{
    InstrumentContext, OutageBackoff, ReconciliationEngine, RetryPolicy, ShutdownSignal, StopReason,
};
use fw_schemas::Instrument;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::state::AppState;

pub struct Orchestrator {
    engine: Arc<ReconciliationEngine>,
    state: Arc<AppState>,
    poll_interval: Duration,
    outage_policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        state: Arc<AppState>,
        poll_interval: Duration,
        outage_policy: RetryPolicy,
    ) -> Self {
        Self {
            engine,
            state,
            poll_interval,
            outage_policy,
        }
    }

    /// Start one loop per instrument. Every loop exits once `shutdown`
    /// fires, after finishing the run it is working on.
    pub fn spawn(self: &Arc<Self>, instruments: Vec<Instrument>, shutdown: &ShutdownSignal) -> Vec<JoinHandle<()>> {
        instruments
            .into_iter()
            .map(|instrument| {
                let this = Arc::clone(self);
                let signal = shutdown.clone();
                tokio::spawn(async move { this.run_instrument(instrument, signal).await })
            })
            .collect()
    }

    pub async fn run_instrument(&self, instrument: Instrument, mut shutdown: ShutdownSignal) {
        let id = instrument.id.clone();
        let mut ctx = InstrumentContext::new(instrument);
        let mut backoff = OutageBackoff::new(self.outage_policy);

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            instrument = %id,
            watch_dir = %ctx.instrument.watch_dir.display(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "instrument loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.requested() => break,
            }
            if !backoff.ready(Instant::now()) {
                continue;
            }

            let outcome = self.engine.tick(&mut ctx, &shutdown).await;
            let finished_at = Utc::now();

            if outcome.state_unavailable() {
                let pause = backoff.record_outage(Instant::now());
                warn!(
                    instrument = %id,
                    consecutive = backoff.consecutive_outages(),
                    pause_ms = pause.as_millis() as u64,
                    "state store outage; pausing instrument"
                );
                let until = chrono::Duration::from_std(pause)
                    .ok()
                    .map(|d| finished_at + d);
                self.state.set_paused_until(&id, until).await;
            } else if backoff.consecutive_outages() > 0 {
                info!(instrument = %id, "state store reachable again; resuming");
                backoff.record_healthy();
                self.state.set_paused_until(&id, None).await;
            }

            self.state.record_tick(&outcome, finished_at).await;

            if outcome.stop == Some(StopReason::Shutdown) {
                break;
            }
        }

        info!(instrument = %id, "instrument loop stopped");
    }
}

//! Cooperative shutdown. The engine checks the signal before every publish
//! and abandons backoff sleeps as soon as it fires.

use tokio::sync::watch;

/// Sending half, held by whoever reacts to SIGINT/SIGTERM.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half, cloned into every instrument loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested. Pends forever if the trigger was
    /// dropped without firing.
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless shutdown comes first. Returns `true` when
    /// the full duration elapsed.
    pub async fn sleep(&self, duration: std::time::Duration) -> bool {
        let mut signal = self.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = signal.requested() => false,
        }
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fw_reconcile::{PublishError, PublishReceipt, Publisher};
use fw_schemas::Notification;

/// One `publish` invocation, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCall {
    pub destination: String,
    pub notification: Notification,
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<PublishCall>,
    /// sequence -> failures still to return before succeeding
    scripted: HashMap<i64, (PublishError, Option<u32>)>,
}

/// Records every publish and fails on a per-sequence script.
#[derive(Debug, Default)]
pub struct FakePublisher {
    inner: Mutex<Inner>,
}

impl FakePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail every publish of `sequence` with `err` until cleared.
    pub fn fail_always(&self, sequence: i64, err: PublishError) {
        self.lock().scripted.insert(sequence, (err, None));
    }

    /// Fail the next `times` publishes of `sequence`, then accept.
    pub fn fail_times(&self, sequence: i64, err: PublishError, times: u32) {
        self.lock().scripted.insert(sequence, (err, Some(times)));
    }

    pub fn clear_failures(&self) {
        self.lock().scripted.clear();
    }

    pub fn calls(&self) -> Vec<PublishCall> {
        self.lock().calls.clone()
    }

    /// Sequences the broker accepted, in delivery order.
    pub fn delivered(&self) -> Vec<i64> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.accepted)
            .map(|c| c.notification.sequence)
            .collect()
    }

    pub fn attempts_for(&self, sequence: i64) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.notification.sequence == sequence)
            .count()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<PublishReceipt, PublishError> {
        let mut inner = self.lock();

        let failure = match inner.scripted.get_mut(&notification.sequence) {
            Some((err, None)) => Some(err.clone()),
            Some((err, Some(left))) if *left > 0 => {
                *left -= 1;
                Some(err.clone())
            }
            _ => None,
        };

        inner.calls.push(PublishCall {
            destination: destination.to_string(),
            notification: notification.clone(),
            accepted: failure.is_none(),
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(PublishReceipt {
                message_id: notification.message_id(),
            }),
        }
    }
}

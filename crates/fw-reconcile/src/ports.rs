//! Dependency seams of the engine.
//!
//! Implementations live in other crates (`fw-db`, `fw-broker`) or in the
//! testkit. Every call is awaited under an engine-side timeout, so an
//! implementation may block for as long as its own connection settings allow.

use std::sync::Arc;

use async_trait::async_trait;
use fw_observe::{ObserveError, ScanReport};
use fw_schemas::{Instrument, Notification, PublishStatus, RunFile};

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Store unreachable or the operation failed. Never means "no state".
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("state store timed out")]
    Timeout,
}

/// Durable per-instrument watermark.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Highest sequence confirmed published, `None` if never recorded.
    async fn get_last_published(&self, instrument_id: &str) -> Result<Option<i64>, StateError>;

    /// Durably raise the watermark. Returns `false` when the stored value was
    /// already `>= sequence` (nothing changed). Must never lower it.
    async fn set_last_published(&self, instrument_id: &str, sequence: i64) -> Result<bool, StateError>;

    /// Best-effort audit row for a failed or skipped run.
    async fn record_failure(
        &self,
        instrument_id: &str,
        sequence: i64,
        status: PublishStatus,
        reason: &str,
    ) -> Result<(), StateError>;
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Transient (network, timeout, broker overloaded). Safe to retry.
    #[error("retryable publish failure: {0}")]
    Retryable(String),

    /// Rejected (malformed message, destination missing). Retrying won't help.
    #[error("permanent publish failure: {0}")]
    Permanent(String),
}

/// Broker confirmation for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver `notification` to `destination`, at least once.
    async fn publish(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<PublishReceipt, PublishError>;
}

// ---------------------------------------------------------------------------
// RunObserver
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RunObserver: Send + Sync {
    /// Control file + listing, capped at the control file's run.
    async fn scan(&self, instrument: &Instrument) -> Result<ScanReport, ObserveError>;

    /// Listing alone, used when the control file is corrupt.
    async fn list(&self, instrument: &Instrument) -> Result<Vec<RunFile>, ObserveError>;
}

// ---------------------------------------------------------------------------
// Arc forwarding
// ---------------------------------------------------------------------------

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn get_last_published(&self, instrument_id: &str) -> Result<Option<i64>, StateError> {
        (**self).get_last_published(instrument_id).await
    }

    async fn set_last_published(&self, instrument_id: &str, sequence: i64) -> Result<bool, StateError> {
        (**self).set_last_published(instrument_id, sequence).await
    }

    async fn record_failure(
        &self,
        instrument_id: &str,
        sequence: i64,
        status: PublishStatus,
        reason: &str,
    ) -> Result<(), StateError> {
        (**self)
            .record_failure(instrument_id, sequence, status, reason)
            .await
    }
}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<PublishReceipt, PublishError> {
        (**self).publish(destination, notification).await
    }
}

#[async_trait]
impl<T: RunObserver + ?Sized> RunObserver for Arc<T> {
    async fn scan(&self, instrument: &Instrument) -> Result<ScanReport, ObserveError> {
        (**self).scan(instrument).await
    }

    async fn list(&self, instrument: &Instrument) -> Result<Vec<RunFile>, ObserveError> {
        (**self).list(instrument).await
    }
}

use async_trait::async_trait;
use fw_reconcile::{StateError, StateStore};
use fw_schemas::PublishStatus;
use sqlx::PgPool;
use tracing::debug;

/// [`StateStore`] over the `watcher_state` / `watcher_failures` tables.
#[derive(Debug, Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unavailable(op: &str, e: sqlx::Error) -> StateError {
    StateError::Unavailable(format!("{op}: {e}"))
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn get_last_published(&self, instrument_id: &str) -> Result<Option<i64>, StateError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "select last_published_sequence from watcher_state where instrument_id = $1",
        )
        .bind(instrument_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("get_last_published", e))?;

        Ok(row.map(|(seq,)| seq))
    }

    async fn set_last_published(&self, instrument_id: &str, sequence: i64) -> Result<bool, StateError> {
        // Forward-only upsert: the conflict branch only fires when it raises
        // the stored value, so concurrent or stale writers can never regress it.
        let res = sqlx::query(
            r#"
            insert into watcher_state (instrument_id, last_published_sequence, updated_at)
            values ($1, $2, now())
            on conflict (instrument_id) do update
              set last_published_sequence = excluded.last_published_sequence,
                  updated_at = excluded.updated_at
              where watcher_state.last_published_sequence < excluded.last_published_sequence
            "#,
        )
        .bind(instrument_id)
        .bind(sequence)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("set_last_published", e))?;

        let advanced = res.rows_affected() == 1;
        debug!(instrument = %instrument_id, sequence, advanced, "watermark upsert");
        Ok(advanced)
    }

    async fn record_failure(
        &self,
        instrument_id: &str,
        sequence: i64,
        status: PublishStatus,
        reason: &str,
    ) -> Result<(), StateError> {
        sqlx::query(
            r#"
            insert into watcher_failures (instrument_id, sequence, status, reason)
            values ($1, $2, $3, $4)
            "#,
        )
        .bind(instrument_id)
        .bind(sequence)
        .bind(status.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("record_failure", e))?;
        Ok(())
    }
}

//! fw-db
//!
//! Postgres persistence for the watcher: the per-instrument watermark and
//! the failure audit trail. [`PgStateStore`] is the engine-facing adapter;
//! the free functions serve the operator CLI.

mod store;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fw_config::DatabaseSettings;
use fw_schemas::{PublishStatus, WatcherState};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::Row;

pub use fw_config::ENV_DATABASE_URL as ENV_DB_URL;
pub use sqlx::PgPool;
pub use store::PgStateStore;

/// Connect from resolved settings. A full URL wins over the discrete fields.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5));

    let connected = match &settings.url {
        Some(url) => pool.connect(url).await,
        None => {
            let opts = PgConnectOptions::new()
                .host(&settings.host)
                .port(settings.port)
                .username(&settings.username)
                .password(&settings.password)
                .database(&settings.database);
            pool.connect_with(opts).await
        }
    };

    let target = match settings.url {
        Some(_) => ENV_DB_URL.to_string(),
        None => format!("{}:{}", settings.host, settings.port),
    };
    connected.with_context(|| format!("failed to connect to Postgres ({target})"))
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_state_table: bool,
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'watcher_state'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_state_table: exists,
    })
}

/// Watermarks, optionally for a single instrument, ordered by instrument.
pub async fn list_states(pool: &PgPool, instrument_id: Option<&str>) -> Result<Vec<WatcherState>> {
    let rows = sqlx::query(
        r#"
        select instrument_id, last_published_sequence, updated_at
        from watcher_state
        where $1::text is null or instrument_id = $1
        order by instrument_id
        "#,
    )
    .bind(instrument_id)
    .fetch_all(pool)
    .await
    .context("list_states failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(WatcherState {
                instrument_id: row.try_get("instrument_id")?,
                last_published_sequence: row.try_get("last_published_sequence")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

/// Overwrite the watermark unconditionally, lower values included.
///
/// Operator intervention only: lowering it makes the watcher re-announce
/// every run above the new value.
pub async fn force_set_last_published(pool: &PgPool, instrument_id: &str, sequence: i64) -> Result<()> {
    sqlx::query(
        r#"
        insert into watcher_state (instrument_id, last_published_sequence, updated_at)
        values ($1, $2, now())
        on conflict (instrument_id) do update
          set last_published_sequence = excluded.last_published_sequence,
              updated_at = excluded.updated_at
        "#,
    )
    .bind(instrument_id)
    .bind(sequence)
    .execute(pool)
    .await
    .context("force_set_last_published failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub id: i64,
    pub instrument_id: String,
    pub sequence: i64,
    pub status: PublishStatus,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Most recent audit rows first.
pub async fn recent_failures(
    pool: &PgPool,
    instrument_id: Option<&str>,
    limit: i64,
) -> Result<Vec<FailureRecord>> {
    let rows = sqlx::query(
        r#"
        select id, instrument_id, sequence, status, reason, recorded_at
        from watcher_failures
        where $1::text is null or instrument_id = $1
        order by recorded_at desc, id desc
        limit $2
        "#,
    )
    .bind(instrument_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("recent_failures failed")?;

    rows.into_iter()
        .map(|row| {
            let status: String = row.try_get("status")?;
            Ok(FailureRecord {
                id: row.try_get("id")?,
                instrument_id: row.try_get("instrument_id")?,
                sequence: row.try_get("sequence")?,
                status: PublishStatus::parse(&status)
                    .with_context(|| format!("unknown failure status in db: {status}"))?,
                reason: row.try_get("reason")?,
                recorded_at: row.try_get("recorded_at")?,
            })
        })
        .collect()
}

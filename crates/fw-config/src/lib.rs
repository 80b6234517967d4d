//! fw-config
//!
//! Single source of truth for watcher configuration.
//!
//! # Contract
//! - Settings come from environment-style variables, read once at startup
//!   via [`WatcherConfig::from_env`]. Nothing else in the workspace calls
//!   `std::env::var` for configuration.
//! - One instrument is described by `INSTRUMENT_FOLDER` + `FILE_PREFIX`;
//!   several by a YAML manifest named in `FW_INSTRUMENTS_FILE`.
//! - Credentials are carried in structs whose `Debug` output is redacted.
//! - Any invalid value is a [`ConfigError`]; the daemon treats it as fatal.

mod manifest;
mod secrets;

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fw_schemas::Instrument;

pub use manifest::{parse_manifest, InstrumentEntry, Manifest};
pub use secrets::{BrokerSettings, DatabaseSettings};

// ---------------------------------------------------------------------------
// Variable names
// ---------------------------------------------------------------------------

pub const ENV_WATCH_DIR: &str = "WATCH_DIR";
pub const ENV_INSTRUMENT_FOLDER: &str = "INSTRUMENT_FOLDER";
pub const ENV_FILE_PREFIX: &str = "FILE_PREFIX";
pub const ENV_FILE_EXTENSION: &str = "FILE_EXTENSION";
pub const ENV_INSTRUMENTS_FILE: &str = "FW_INSTRUMENTS_FILE";
pub const ENV_SCAN_DEPTH: &str = "SCAN_DEPTH";

pub const ENV_BROKER_URL: &str = "BROKER_URL";
pub const ENV_BROKER_USER: &str = "BROKER_USER";
pub const ENV_BROKER_PASSWORD: &str = "BROKER_PASSWORD";
pub const ENV_BROKER_VHOST: &str = "BROKER_VHOST";
pub const ENV_BROKER_EXCHANGE: &str = "BROKER_EXCHANGE";
pub const ENV_EGRESS_QUEUE_NAME: &str = "EGRESS_QUEUE_NAME";

pub const ENV_DATABASE_URL: &str = "FW_DATABASE_URL";
pub const ENV_DB_IP: &str = "DB_IP";
pub const ENV_DB_PORT: &str = "DB_PORT";
pub const ENV_DB_USERNAME: &str = "DB_USERNAME";
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_DB_NAME: &str = "DB_NAME";

pub const ENV_POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "RETRY_BASE_DELAY_MS";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "RETRY_MAX_DELAY_MS";
pub const ENV_MISSING_FILE_GRACE_TICKS: &str = "MISSING_FILE_GRACE_TICKS";
pub const ENV_STATE_TIMEOUT_MS: &str = "STATE_TIMEOUT_MS";
pub const ENV_PUBLISH_TIMEOUT_MS: &str = "PUBLISH_TIMEOUT_MS";
pub const ENV_SCAN_TIMEOUT_MS: &str = "SCAN_TIMEOUT_MS";
pub const ENV_DAEMON_ADDR: &str = "FW_DAEMON_ADDR";

/// Folder-name prefix used by the archive layout (`NDXMARI` holds `MARI`).
const ARCHIVE_FOLDER_PREFIX: &str = "NDX";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CONFIG_INVALID {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("CONFIG_MANIFEST {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("CONFIG_NO_INSTRUMENTS: set {ENV_INSTRUMENT_FOLDER} or {ENV_INSTRUMENTS_FILE}")]
    NoInstruments,

    #[error("CONFIG_DUPLICATE_INSTRUMENT {0}")]
    DuplicateInstrument(String),
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Settings groups
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for publish and state-commit retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Connection-level timeouts applied to each blocking dependency call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSettings {
    pub state: Duration,
    pub publish: Duration,
    pub scan: Duration,
}

/// Fully resolved watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub archive_root: PathBuf,
    pub instruments: Vec<Instrument>,
    pub scan_depth: usize,
    pub broker: BrokerSettings,
    pub database: DatabaseSettings,
    pub poll_interval: Duration,
    pub retry: RetrySettings,
    pub missing_file_grace_ticks: u32,
    pub timeouts: TimeoutSettings,
    pub daemon_addr: SocketAddr,
}

impl WatcherConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let archive_root = PathBuf::from(get(ENV_WATCH_DIR).unwrap_or_else(|| "/archive".to_string()));
        let default_extension = get(ENV_FILE_EXTENSION).unwrap_or_else(|| "nxs".to_string());
        let default_destination =
            get(ENV_EGRESS_QUEUE_NAME).unwrap_or_else(|| "watched-files".to_string());

        let entries = match get(ENV_INSTRUMENTS_FILE) {
            Some(path) => manifest::load_manifest(Path::new(&path))?.instruments,
            None => match get(ENV_INSTRUMENT_FOLDER) {
                Some(folder) => vec![InstrumentEntry {
                    folder,
                    file_prefix: get(ENV_FILE_PREFIX).unwrap_or_else(|| "MAR".to_string()),
                    ..InstrumentEntry::default()
                }],
                None => return Err(ConfigError::NoInstruments),
            },
        };

        let instruments = resolve_instruments(
            &archive_root,
            &entries,
            &default_extension,
            &default_destination,
        )?;

        let broker = BrokerSettings {
            url: get(ENV_BROKER_URL).unwrap_or_else(|| "http://localhost:15672".to_string()),
            username: get(ENV_BROKER_USER).unwrap_or_else(|| "guest".to_string()),
            password: get(ENV_BROKER_PASSWORD).unwrap_or_else(|| "guest".to_string()),
            vhost: get(ENV_BROKER_VHOST).unwrap_or_else(|| "/".to_string()),
            exchange: get(ENV_BROKER_EXCHANGE).unwrap_or_else(|| "amq.default".to_string()),
        };

        let database = database_from_lookup(&lookup)?;

        let poll_interval = positive_ms(get(ENV_POLL_INTERVAL_MS), ENV_POLL_INTERVAL_MS, 1_000)?;

        let max_attempts: u32 = parse_or(get(ENV_RETRY_MAX_ATTEMPTS), ENV_RETRY_MAX_ATTEMPTS, 5)?;
        if max_attempts == 0 {
            return Err(invalid(ENV_RETRY_MAX_ATTEMPTS, "must be >= 1"));
        }
        let base_delay = positive_ms(get(ENV_RETRY_BASE_DELAY_MS), ENV_RETRY_BASE_DELAY_MS, 200)?;
        let max_delay = positive_ms(get(ENV_RETRY_MAX_DELAY_MS), ENV_RETRY_MAX_DELAY_MS, 10_000)?;
        if max_delay < base_delay {
            return Err(invalid(
                ENV_RETRY_MAX_DELAY_MS,
                format!("must be >= {ENV_RETRY_BASE_DELAY_MS}"),
            ));
        }

        let timeouts = TimeoutSettings {
            state: positive_ms(get(ENV_STATE_TIMEOUT_MS), ENV_STATE_TIMEOUT_MS, 5_000)?,
            publish: positive_ms(get(ENV_PUBLISH_TIMEOUT_MS), ENV_PUBLISH_TIMEOUT_MS, 10_000)?,
            scan: positive_ms(get(ENV_SCAN_TIMEOUT_MS), ENV_SCAN_TIMEOUT_MS, 30_000)?,
        };

        let scan_depth: usize = parse_or(get(ENV_SCAN_DEPTH), ENV_SCAN_DEPTH, 2)?;
        if scan_depth == 0 {
            return Err(invalid(ENV_SCAN_DEPTH, "must be >= 1"));
        }

        let daemon_addr = parse_or(
            get(ENV_DAEMON_ADDR),
            ENV_DAEMON_ADDR,
            SocketAddr::from(([127, 0, 0, 1], 8898)),
        )?;

        Ok(Self {
            archive_root,
            instruments,
            scan_depth,
            broker,
            database,
            poll_interval,
            retry: RetrySettings {
                max_attempts,
                base_delay,
                max_delay,
            },
            missing_file_grace_ticks: parse_or(
                get(ENV_MISSING_FILE_GRACE_TICKS),
                ENV_MISSING_FILE_GRACE_TICKS,
                30,
            )?,
            timeouts,
            daemon_addr,
        })
    }

    pub fn instrument(&self, id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == id)
    }
}

/// Database settings alone, for tools that never watch an instrument.
pub fn database_from_env() -> Result<DatabaseSettings, ConfigError> {
    database_from_lookup(|k| std::env::var(k).ok())
}

pub fn database_from_lookup<F>(lookup: F) -> Result<DatabaseSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    Ok(DatabaseSettings {
        url: get(ENV_DATABASE_URL),
        host: get(ENV_DB_IP).unwrap_or_else(|| "localhost".to_string()),
        port: parse_or(get(ENV_DB_PORT), ENV_DB_PORT, 5432u16)?,
        username: get(ENV_DB_USERNAME).unwrap_or_else(|| "admin".to_string()),
        password: get(ENV_DB_PASSWORD).unwrap_or_else(|| "admin".to_string()),
        database: get(ENV_DB_NAME).unwrap_or_else(|| "interactive-reduction".to_string()),
    })
}

/// Instrument identifier for an archive folder: `NDXMARI` -> `MARI`.
pub fn instrument_id_from_folder(folder: &str) -> &str {
    match folder.strip_prefix(ARCHIVE_FOLDER_PREFIX) {
        Some(rest) if !rest.is_empty() => rest,
        _ => folder,
    }
}

fn resolve_instruments(
    root: &Path,
    entries: &[InstrumentEntry],
    default_extension: &str,
    default_destination: &str,
) -> Result<Vec<Instrument>, ConfigError> {
    if entries.is_empty() {
        return Err(ConfigError::NoInstruments);
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for e in entries {
        let folder = e.folder.trim();
        if folder.is_empty() {
            return Err(invalid("instrument.folder", "must not be empty"));
        }
        let id = e
            .id
            .clone()
            .unwrap_or_else(|| instrument_id_from_folder(folder).to_string());
        if id.trim().is_empty() {
            return Err(invalid("instrument.id", format!("empty id for folder {folder}")));
        }
        if e.file_prefix.trim().is_empty() {
            return Err(invalid(
                "instrument.file_prefix",
                format!("empty prefix for {id}"),
            ));
        }
        if !seen.insert(id.clone()) {
            return Err(ConfigError::DuplicateInstrument(id));
        }

        let base = root.join(folder).join("Instrument");
        out.push(Instrument {
            watch_dir: e.watch_dir.clone().unwrap_or_else(|| base.join("data")),
            control_file: e
                .control_file
                .clone()
                .unwrap_or_else(|| base.join("logs").join("lastrun.txt")),
            file_prefix: e.file_prefix.trim().to_string(),
            file_extension: e
                .file_extension
                .clone()
                .unwrap_or_else(|| default_extension.to_string()),
            destination: e
                .destination
                .clone()
                .unwrap_or_else(|| default_destination.to_string()),
            id,
        });
    }
    Ok(out)
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| invalid(key, format!("cannot parse {s:?}"))),
    }
}

fn positive_ms(raw: Option<String>, key: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms: u64 = parse_or(raw, key, default_ms)?;
    if ms == 0 {
        return Err(invalid(key, "must be > 0"));
    }
    Ok(Duration::from_millis(ms))
}

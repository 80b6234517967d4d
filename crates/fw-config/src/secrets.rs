//! Connection settings that carry credentials.
//!
//! `Debug` output never prints passwords or a database URL (which may embed
//! one). Error messages elsewhere reference variable NAMES, never values.

use std::fmt;

/// Broker HTTP API endpoint and credentials.
#[derive(Clone)]
pub struct BrokerSettings {
    /// Base URL of the broker's HTTP API, e.g. `http://rabbitmq:15672`.
    pub url: String,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
}

impl fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("vhost", &self.vhost)
            .field("exchange", &self.exchange)
            .finish()
    }
}

/// Postgres connection settings.
///
/// A full `url` wins over the discrete fields when present.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &self.url.as_ref().map(|_| "<REDACTED>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("database", &self.database)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_credentials() {
        let broker = BrokerSettings {
            url: "http://mq:15672".to_string(),
            username: "watcher".to_string(),
            password: "hunter2-broker".to_string(),
            vhost: "/".to_string(),
            exchange: "amq.default".to_string(),
        };
        let db = DatabaseSettings {
            url: Some("postgres://u:hunter2-db@db/x".to_string()),
            host: "db".to_string(),
            port: 5432,
            username: "u".to_string(),
            password: "hunter2-db".to_string(),
            database: "x".to_string(),
        };

        let printed = format!("{broker:?} {db:?}");
        assert!(!printed.contains("hunter2"), "secret leaked: {printed}");
        assert!(printed.contains("<REDACTED>"));
        assert!(printed.contains("watcher"));
    }
}

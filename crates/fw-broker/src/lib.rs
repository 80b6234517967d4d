//! fw-broker
//!
//! Publishes run notifications through the RabbitMQ management HTTP API
//! (`POST /api/exchanges/{vhost}/{exchange}/publish`).
//!
//! Messages are persistent (`delivery_mode = 2`) and carry
//! `<instrument>:<sequence>` as `message_id` so consumers can drop the
//! duplicates at-least-once delivery allows. A publish only counts as
//! confirmed when the broker answers `{"routed": true}`.

mod classify;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use fw_config::BrokerSettings;
use fw_reconcile::{PublishError, PublishReceipt, Publisher};
use fw_schemas::Notification;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use classify::{is_retryable_http_status, is_retryable_transport_error};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("invalid broker url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct Properties<'a> {
    delivery_mode: u8,
    content_type: &'static str,
    message_id: &'a str,
}

#[derive(Serialize)]
struct PublishBody<'a> {
    properties: Properties<'a>,
    routing_key: &'a str,
    payload: String,
    payload_encoding: &'static str,
}

#[derive(Deserialize)]
struct PublishResponse {
    routed: bool,
}

/// [`Publisher`] over the broker's HTTP API.
#[derive(Clone)]
pub struct HttpPublisher {
    http: reqwest::Client,
    endpoint: Url,
    username: String,
    password: String,
}

impl fmt::Debug for HttpPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPublisher")
            .field("endpoint", &self.endpoint.as_str())
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl HttpPublisher {
    pub fn new(settings: &BrokerSettings, request_timeout: Duration) -> Result<Self, BrokerError> {
        let endpoint = publish_endpoint(&settings.url, &settings.vhost, &settings.exchange)?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// `{base}/api/exchanges/{vhost}/{exchange}/publish`, with `/` inside the
/// vhost or exchange name percent-encoded.
pub fn publish_endpoint(base: &str, vhost: &str, exchange: &str) -> Result<Url, BrokerError> {
    let invalid = |reason: String| BrokerError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("url cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(["api", "exchanges", vhost, exchange, "publish"]);
    Ok(url)
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<PublishReceipt, PublishError> {
        let message_id = notification.message_id();
        let payload = serde_json::to_string(notification)
            .map_err(|e| PublishError::Permanent(format!("notification encode failed: {e}")))?;

        let body = PublishBody {
            properties: Properties {
                delivery_mode: 2,
                content_type: "application/json",
                message_id: &message_id,
            },
            routing_key: destination,
            payload,
            payload_encoding: "string",
        };

        let resp = self
            .http
            .post(self.endpoint.clone())
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(classify::transport_failure)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify::status_failure(status.as_u16(), &text));
        }

        let parsed: PublishResponse = resp.json().await.map_err(|e| {
            // Outcome unknown, so the publish counts as unconfirmed.
            PublishError::Retryable(format!("unreadable publish confirmation: {e}"))
        })?;

        if !parsed.routed {
            return Err(PublishError::Permanent(format!(
                "message not routed: no queue bound for {destination:?}"
            )));
        }

        debug!(message_id = %message_id, destination, "broker confirmed publish");
        Ok(PublishReceipt { message_id })
    }
}

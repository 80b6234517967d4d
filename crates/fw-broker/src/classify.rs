//! Retryable vs permanent, for both transport errors and HTTP statuses.

use fw_reconcile::PublishError;

/// Statuses worth retrying: timeouts, throttling, and gateway/server trouble.
pub fn is_retryable_http_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

pub fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

pub(crate) fn transport_failure(err: reqwest::Error) -> PublishError {
    if is_retryable_transport_error(&err) {
        PublishError::Retryable(format!("broker unreachable: {err}"))
    } else {
        PublishError::Permanent(format!("broker request failed: {err}"))
    }
}

pub(crate) fn status_failure(status: u16, body: &str) -> PublishError {
    let body = body.trim();
    let detail = if body.len() > 200 {
        let mut end = 200;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        &body[..end]
    } else {
        body
    };

    let reason = format!("broker http status={status} body={detail}");
    if is_retryable_http_status(status) {
        PublishError::Retryable(reason)
    } else {
        PublishError::Permanent(reason)
    }
}

//! Client side of the companion connection check.
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::server::TestAck;

/// Upper bound for any request to the companion endpoint.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("companion server is not running")]
    NotRunning,
    #[error("invalid companion port {0}")]
    InvalidPort(i64),
    #[error("timed out waiting for the companion server")]
    Timeout,
    #[error("could not connect to the companion server: {0}")]
    Connection(String),
    #[error("companion server answered with status {0}")]
    Status(u16),
    #[error("companion request failed: {0}")]
    Other(String),
}

fn classify(err: reqwest::Error) -> NotifyError {
    if err.is_timeout() {
        NotifyError::Timeout
    } else if err.is_connect() {
        NotifyError::Connection(err.to_string())
    } else if let Some(status) = err.status() {
        NotifyError::Status(status.as_u16())
    } else {
        NotifyError::Other(err.to_string())
    }
}

/// Posts a test message to `http://{host}:{port}/test_connection`.
///
/// Port 0 is rejected here: it is only meaningful when binding.
pub async fn send_test_message(host: &str, port: i64) -> Result<TestAck, NotifyError> {
    send_test_message_with_timeout(host, port, NOTIFY_TIMEOUT).await
}

/// [`send_test_message`] with a caller-chosen bound instead of [`NOTIFY_TIMEOUT`].
pub async fn send_test_message_with_timeout(
    host: &str,
    port: i64,
    timeout: Duration,
) -> Result<TestAck, NotifyError> {
    if !(1..=65535).contains(&port) {
        error!(port, "invalid companion port");
        return Err(NotifyError::InvalidPort(port));
    }

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| NotifyError::Other(e.to_string()))?;
    let url = format!("http://{host}:{port}/test_connection");

    let result = async {
        let response = client
            .post(&url)
            .json(&json!({ "message": "Test Connection from Desktop App" }))
            .send()
            .await?
            .error_for_status()?;
        response.json::<TestAck>().await
    }
    .await;

    match result {
        Ok(ack) => {
            info!(%url, status = %ack.status, "companion test message delivered");
            Ok(ack)
        }
        Err(e) => {
            let err = classify(e);
            match &err {
                NotifyError::Timeout => error!(%url, "companion test message timed out"),
                other => error!(%url, error = %other, "companion test message failed"),
            }
            Err(err)
        }
    }
}

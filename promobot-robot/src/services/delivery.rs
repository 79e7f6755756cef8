//! Message transport abstraction and retrying dispatch

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Gateway returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Unexpected gateway response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Worth retrying: network trouble, timeouts, 5xx and 429
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout => true,
            TransportError::Http { status, .. } => *status >= 500 || *status == 429,
            TransportError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Gateway acknowledgement of a sent message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Session state of the gateway instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub instance: String,
    pub state: String,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }
}

/// Group known to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGroup {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub size: Option<i64>,
}

/// A message ready to go out
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub text: String,
    /// Sent as a captioned image when present
    pub media_url: Option<String>,
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<SendReceipt, TransportError>;

    async fn send_media(&self, chat_id: &str, media_url: &str, caption: &str) -> Result<SendReceipt, TransportError>;

    async fn connection_state(&self) -> Result<ConnectionState, TransportError>;

    async fn list_groups(&self) -> Result<Vec<RemoteGroup>, TransportError>;
}

/// Send one message, as media when it carries an image
pub async fn dispatch(
    transport: &dyn MessageTransport,
    message: &OutboundMessage,
) -> Result<SendReceipt, TransportError> {
    match &message.media_url {
        Some(url) => transport.send_media(&message.chat_id, url, &message.text).await,
        None => transport.send_text(&message.chat_id, &message.text).await,
    }
}

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Delay before retry n is `base_delay × n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Final outcome of a retried dispatch
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub result: Result<SendReceipt, TransportError>,
    pub attempts: u32,
}

/// Dispatch with retries on transient errors
///
/// Permanent errors return immediately.
pub async fn dispatch_with_retry(
    transport: &dyn MessageTransport,
    message: &OutboundMessage,
    policy: RetryPolicy,
) -> DispatchOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match dispatch(transport, message).await {
            Ok(receipt) => {
                if attempt > 1 {
                    tracing::info!(chat_id = %message.chat_id, attempt, "Message sent after retry");
                }
                return DispatchOutcome {
                    result: Ok(receipt),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.base_delay * attempt;
                tracing::warn!(
                    chat_id = %message.chat_id,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Send failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::warn!(chat_id = %message.chat_id, attempt, error = %e, "Send failed");
                return DispatchOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

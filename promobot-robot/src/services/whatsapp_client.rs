//! Evolution API (WhatsApp gateway) client
//!
//! Outbound messages are paced with a `governor` quota on top of the
//! orchestrator's own inter-send delay.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use promobot_common::config::GatewayConfig;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::time::Duration;

use super::delivery::{ConnectionState, MessageTransport, RemoteGroup, SendReceipt, TransportError};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Deserialize)]
struct SendResponse {
    key: Option<MessageKey>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionStateResponse {
    instance: InstanceState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceState {
    instance_name: Option<String>,
    state: String,
}

pub struct EvolutionClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    instance: String,
    limiter: DirectLimiter,
}

impl EvolutionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        instance: impl Into<String>,
        timeout: Duration,
        messages_per_minute: u32,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let per_minute = NonZeroU32::new(messages_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            instance: instance.into(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    /// From a validated `[gateway]` section
    pub fn from_config(config: &GatewayConfig) -> Result<Self, TransportError> {
        Self::new(
            config.base_url.clone().unwrap_or_default(),
            config.api_key.clone().unwrap_or_default(),
            config.instance.clone(),
            Duration::from_secs(config.timeout_secs),
            config.messages_per_minute,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, path, self.instance)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn post_message(&self, path: &str, body: serde_json::Value) -> Result<SendReceipt, TransportError> {
        self.limiter.until_ready().await;

        let response = self
            .http_client
            .post(self.url(path))
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(SendReceipt {
            message_id: parsed.key.and_then(|k| k.id),
        })
    }
}

#[async_trait]
impl MessageTransport for EvolutionClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<SendReceipt, TransportError> {
        tracing::debug!(chat_id = %chat_id, "Sending text message");
        self.post_message("message/sendText", json!({ "number": chat_id, "text": text }))
            .await
    }

    async fn send_media(&self, chat_id: &str, media_url: &str, caption: &str) -> Result<SendReceipt, TransportError> {
        tracing::debug!(chat_id = %chat_id, media_url = %media_url, "Sending media message");
        self.post_message(
            "message/sendMedia",
            json!({
                "number": chat_id,
                "mediatype": "image",
                "media": media_url,
                "caption": caption,
            }),
        )
        .await
    }

    async fn connection_state(&self) -> Result<ConnectionState, TransportError> {
        let response = self
            .http_client
            .get(self.url("instance/connectionState"))
            .header("apikey", &self.api_key)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let parsed: ConnectionStateResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(ConnectionState {
            instance: parsed.instance.instance_name.unwrap_or_else(|| self.instance.clone()),
            state: parsed.instance.state,
        })
    }

    async fn list_groups(&self) -> Result<Vec<RemoteGroup>, TransportError> {
        let response = self
            .http_client
            .get(self.url("group/fetchAllGroups"))
            .query(&[("getParticipants", "false")])
            .header("apikey", &self.api_key)
            .send()
            .await?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

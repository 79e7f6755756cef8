//! In-process stand-ins for listing sources and the messaging gateway

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use promobot_robot::models::{CandidateListing, Category, Platform};
use promobot_robot::services::{
    ConnectionState, FetchError, ListingSource, MessageTransport, RemoteGroup, SendReceipt, TransportError,
};

/// Source returning a fixed listing set
pub struct FakeSource {
    platform: Platform,
    listings: Vec<CandidateListing>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(platform: Platform, listings: Vec<CandidateListing>) -> Self {
        Self {
            platform,
            listings,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ListingSource for FakeSource {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search(&self, _category: Category, limit: usize) -> Result<Vec<CandidateListing>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.listings.iter().take(limit).cloned().collect())
    }
}

/// Source that always answers 503
pub struct FailingSource(pub Platform);

#[async_trait]
impl ListingSource for FailingSource {
    fn platform(&self) -> Platform {
        self.0
    }

    async fn search(&self, _category: Category, _limit: usize) -> Result<Vec<CandidateListing>, FetchError> {
        Err(FetchError::Http {
            platform: self.0,
            status: 503,
        })
    }
}

/// Source that takes `delay` before answering with nothing
pub struct SlowSource {
    pub platform: Platform,
    pub delay: Duration,
}

#[async_trait]
impl ListingSource for SlowSource {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search(&self, _category: Category, _limit: usize) -> Result<Vec<CandidateListing>, FetchError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

/// A message the transport was asked to send
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    pub media_url: Option<String>,
}

/// Transport replaying scripted send results, then succeeding
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<SendReceipt, TransportError>>>,
    sent: Mutex<Vec<SentMessage>>,
    remote_groups: Vec<RemoteGroup>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends with a transient 503
    pub fn failing_times(n: usize) -> Self {
        let transport = Self::new();
        for _ in 0..n {
            transport.push(Err(TransportError::Http {
                status: 503,
                body: "unavailable".to_string(),
            }));
        }
        transport
    }

    pub fn with_groups(mut self, groups: Vec<RemoteGroup>) -> Self {
        self.remote_groups = groups;
        self
    }

    pub fn push(&self, result: Result<SendReceipt, TransportError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Every send attempt so far, successful or not
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn next(&self, message: SentMessage) -> Result<SendReceipt, TransportError> {
        let attempt = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(message);
            sent.len()
        };
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(SendReceipt {
                message_id: Some(format!("MSG{}", attempt)),
            })
        })
    }
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<SendReceipt, TransportError> {
        self.next(SentMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            media_url: None,
        })
    }

    async fn send_media(&self, chat_id: &str, media_url: &str, caption: &str) -> Result<SendReceipt, TransportError> {
        self.next(SentMessage {
            chat_id: chat_id.to_string(),
            text: caption.to_string(),
            media_url: Some(media_url.to_string()),
        })
    }

    async fn connection_state(&self) -> Result<ConnectionState, TransportError> {
        Ok(ConnectionState {
            instance: "promobot".to_string(),
            state: "open".to_string(),
        })
    }

    async fn list_groups(&self) -> Result<Vec<RemoteGroup>, TransportError> {
        Ok(self.remote_groups.clone())
    }
}

//! Test helpers for integration tests.
//!
//! Provides in-memory fakes for the feed source and the delivery sink.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use newsrelay::config::RelayConfig;
use newsrelay::{
    ChannelId, Database, DeliverySink, FeedSource, FetchOutcome, PolledEntry, Relay, RelayError,
    RenderMode, Result,
};

/// Feed source serving canned outcomes per URL.
///
/// Unknown URLs fail like a missing page.
#[derive(Default)]
pub struct FakeFeedSource {
    feeds: Mutex<HashMap<String, FetchOutcome>>,
    fetch_count: Mutex<usize>,
}

impl FakeFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these entries for `url` from now on.
    pub fn serve(&self, url: &str, entries: Vec<PolledEntry>) {
        self.feeds
            .lock()
            .unwrap()
            .insert(url.to_string(), FetchOutcome::Parsed(entries));
    }

    /// Make fetches of `url` fail.
    pub fn break_feed(&self, url: &str, reason: &str) {
        self.feeds
            .lock()
            .unwrap()
            .insert(url.to_string(), FetchOutcome::Failed(reason.to_string()));
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }
}

#[async_trait]
impl FeedSource for FakeFeedSource {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        *self.fetch_count.lock().unwrap() += 1;
        self.feeds
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchOutcome::Failed("HTTP error: 404 Not Found".to_string()))
    }
}

/// A message the sink accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub channel_id: ChannelId,
    pub text: String,
    pub mode: RenderMode,
}

/// Sink recording every accepted message.
///
/// Can be told to reject markup, or everything, for chosen channels.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    reject_markup: Mutex<Vec<ChannelId>>,
    reject_all: Mutex<Vec<ChannelId>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_markup_for(&self, channel_id: ChannelId) {
        self.reject_markup.lock().unwrap().push(channel_id);
    }

    pub fn reject_all_for(&self, channel_id: ChannelId) {
        self.reject_all.lock().unwrap().push(channel_id);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.channel_id == channel_id)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send(&self, channel_id: ChannelId, text: &str, mode: RenderMode) -> Result<()> {
        if self.reject_all.lock().unwrap().contains(&channel_id) {
            return Err(RelayError::Delivery("chat not found".to_string()));
        }
        if mode == RenderMode::Markup && self.reject_markup.lock().unwrap().contains(&channel_id) {
            return Err(RelayError::Delivery("can't parse entities".to_string()));
        }
        self.sent.lock().unwrap().push(Sent {
            channel_id,
            text: text.to_string(),
            mode,
        });
        Ok(())
    }
}

/// An entry with a native id and a link derived from `key`.
pub fn entry(key: &str, title: &str) -> PolledEntry {
    PolledEntry::new(title)
        .with_id(format!("urn:{}", key))
        .with_link(format!("https://news.example.com/{}", key))
}

/// Relay over a fresh in-memory database.
pub async fn setup_relay(config: RelayConfig) -> (Relay, Arc<FakeFeedSource>, Arc<RecordingSink>) {
    let db = Arc::new(Database::open_in_memory().await.unwrap());
    let source = Arc::new(FakeFeedSource::new());
    let sink = Arc::new(RecordingSink::new());
    let relay = Relay::new(db, source.clone(), sink.clone(), config);
    (relay, source, sink)
}

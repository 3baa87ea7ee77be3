//! Subscription types for newsrelay.

use chrono::{DateTime, Utc};

/// Default per-channel subscription limit.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 10;

/// Opaque destination identity (a chat id).
pub type ChannelId = i64;

/// A named feed source owned by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Row ID.
    pub id: i64,
    /// Owning channel.
    pub channel_id: ChannelId,
    /// Name, unique within the channel.
    pub name: String,
    /// Source URL.
    pub url: String,
    /// When the subscription was registered.
    pub created_at: DateTime<Utc>,
}

/// New subscription for registration.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// Owning channel.
    pub channel_id: ChannelId,
    /// Subscription name.
    pub name: String,
    /// Source URL.
    pub url: String,
}

impl NewSubscription {
    /// Create a new subscription. Name and URL are trimmed.
    pub fn new(channel_id: ChannelId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            channel_id,
            name: name.into().trim().to_string(),
            url: url.into().trim().to_string(),
        }
    }

    /// Reason this subscription can't be stored, if any.
    pub fn invalid_reason(&self) -> Option<String> {
        if self.name.is_empty() {
            return Some("subscription name is empty".to_string());
        }
        if self.url.is_empty() {
            return Some("source URL is empty".to_string());
        }
        None
    }
}

/// Outcome of registering a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddResult {
    /// Subscription stored.
    Added,
    /// The channel already holds the maximum number of subscriptions.
    AtCapacity,
    /// The channel already has a subscription with this name.
    Duplicate,
    /// The name/URL were rejected, or the source isn't a usable feed.
    Invalid(String),
}

impl AddResult {
    /// Whether the subscription was stored.
    pub fn is_added(&self) -> bool {
        matches!(self, AddResult::Added)
    }
}

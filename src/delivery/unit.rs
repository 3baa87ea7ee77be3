//! Delivery units and the send-with-fallback path.

use tracing::{debug, warn};

use super::sink::{DeliverySink, RenderMode};
use crate::subscription::ChannelId;

/// Transport message length limit, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Appended to truncated messages.
pub const TRUNCATION_SUFFIX: &str = "...";

/// Formatted text derived from one new entry (or a notice), ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryUnit {
    /// Rich-text rendition. `None` for plain-only notices.
    pub markup: Option<String>,
    /// Plain-text rendition, used as the fallback.
    pub plain: String,
}

impl DeliveryUnit {
    /// A unit with both a markup and a plain rendition.
    pub fn markup(markup: impl Into<String>, plain: impl Into<String>) -> Self {
        Self {
            markup: Some(markup.into()),
            plain: plain.into(),
        }
    }

    /// A plain-text-only unit.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            markup: None,
            plain: text.into(),
        }
    }

    /// Text sent on the first attempt.
    pub fn primary_text(&self) -> &str {
        self.markup.as_deref().unwrap_or(&self.plain)
    }
}

/// Result of delivering one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent on the first attempt.
    Sent,
    /// Markup was rejected; sent as plain text.
    SentPlain,
    /// Both attempts failed; the unit is dropped.
    Dropped,
}

impl DeliveryOutcome {
    /// Whether the unit reached the channel.
    pub fn is_delivered(&self) -> bool {
        !matches!(self, DeliveryOutcome::Dropped)
    }
}

/// Cap text at the transport limit.
///
/// Longer text keeps its first 4093 characters followed by `...`, so the
/// result is never longer than `MAX_MESSAGE_LENGTH` characters.
pub fn truncate_text(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        return text.to_string();
    }

    let keep = MAX_MESSAGE_LENGTH - TRUNCATION_SUFFIX.len();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

/// Deliver one unit to a channel.
///
/// The unit is truncated, sent with markup, and on failure re-sent once as
/// plain text. A unit that fails both ways is logged and dropped; its seen
/// mark is kept, trading a lost message for no duplicate spam.
pub async fn deliver(
    sink: &dyn DeliverySink,
    channel_id: ChannelId,
    unit: &DeliveryUnit,
) -> DeliveryOutcome {
    let plain = truncate_text(&unit.plain);

    if let Some(markup) = &unit.markup {
        let markup = truncate_text(markup);
        match sink.send(channel_id, &markup, RenderMode::Markup).await {
            Ok(()) => return DeliveryOutcome::Sent,
            Err(e) => {
                warn!(
                    "Markup send to channel {} failed, retrying as plain text: {}",
                    channel_id, e
                );
            }
        }

        return match sink.send(channel_id, &plain, RenderMode::Plain).await {
            Ok(()) => DeliveryOutcome::SentPlain,
            Err(e) => {
                warn!("Dropping message for channel {}: {}", channel_id, e);
                debug!("Dropped text: {}", plain);
                DeliveryOutcome::Dropped
            }
        };
    }

    match sink.send(channel_id, &plain, RenderMode::Plain).await {
        Ok(()) => DeliveryOutcome::Sent,
        Err(e) => {
            warn!("Dropping message for channel {}: {}", channel_id, e);
            DeliveryOutcome::Dropped
        }
    }
}

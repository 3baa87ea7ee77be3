//! Subscription registry for newsrelay.
//!
//! Channels register named feed sources here; the scheduler reads the
//! whole registry on every tick.

pub mod repository;
pub mod types;

pub use repository::SubscriptionRepository;
pub use types::{AddResult, ChannelId, NewSubscription, Subscription, DEFAULT_MAX_SUBSCRIPTIONS};

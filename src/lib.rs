//! newsrelay - feed subscription relay
//!
//! Channels subscribe to named feed sources; a scheduler polls every source
//! periodically and delivers entries that were never delivered before.

pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod feed;
pub mod logging;
pub mod relay;
pub mod scheduler;
pub mod subscription;

pub use config::Config;
pub use db::Database;
pub use delivery::{deliver, ConsoleSink, DeliveryOutcome, DeliverySink, DeliveryUnit, RenderMode};
pub use error::{RelayError, Result};
pub use feed::{FeedDiffer, FeedSource, FetchOutcome, HttpFeedSource, PolledEntry};
pub use relay::{FetchNowReport, Relay, RelayService, SourceReport, TickSummary};
pub use scheduler::{DeliveryScheduler, IntervalChange, SchedulerState, TickHandler};
pub use subscription::{AddResult, ChannelId, SubscriptionRepository};

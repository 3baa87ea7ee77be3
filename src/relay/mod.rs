//! Relay module for newsrelay.
//!
//! Ties the subscription registry, feed differ and delivery sink together:
//! - Subscription management for the command layer
//! - On-demand fetches for one channel
//! - Scheduled delivery ticks
//! - The service facade owning the scheduler

mod poller;
mod service;

pub use poller::{no_news_notice, FetchNowReport, Relay, SourceReport, TickSummary};
pub use service::RelayService;

//! Relay service: the relay core plus the scheduler that drives it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::relay::poller::{FetchNowReport, Relay};
use crate::scheduler::{DeliveryScheduler, IntervalChange, SchedulerState};
use crate::subscription::{AddResult, ChannelId};
use crate::Result;

/// Interface exposed to the command layer.
///
/// Owns the one scheduler of the process; whoever needs to change the
/// delivery interval goes through this object.
pub struct RelayService {
    relay: Arc<Relay>,
    scheduler: DeliveryScheduler,
}

impl RelayService {
    /// Start scheduled delivery for `relay`.
    pub fn start(relay: Relay, config: &SchedulerConfig) -> Self {
        let relay = Arc::new(relay);
        let scheduler = DeliveryScheduler::start(relay.clone(), config);
        Self { relay, scheduler }
    }

    /// The relay core.
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Current delivery interval.
    pub fn interval(&self) -> Duration {
        self.scheduler.interval()
    }

    /// Scheduler state.
    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Register a named source for a channel.
    pub async fn register_subscription(
        &self,
        channel_id: ChannelId,
        name: &str,
        url: &str,
    ) -> Result<AddResult> {
        self.relay.register_subscription(channel_id, name, url).await
    }

    /// Remove a channel's subscription; false if it didn't exist.
    pub async fn unregister_subscription(&self, channel_id: ChannelId, name: &str) -> Result<bool> {
        self.relay.unregister_subscription(channel_id, name).await
    }

    /// List a channel's subscriptions (name -> URL).
    pub async fn list_subscriptions(&self, channel_id: ChannelId) -> Result<BTreeMap<String, String>> {
        self.relay.list_subscriptions(channel_id).await
    }

    /// Deliver what is new for one channel right away.
    pub async fn fetch_now(&self, channel_id: ChannelId) -> Result<FetchNowReport> {
        self.relay.fetch_now(channel_id).await
    }

    /// Change the delivery interval (in minutes, at least 1).
    pub fn reconfigure_interval(&self, minutes: i64) -> IntervalChange {
        self.scheduler.reconfigure_interval(minutes)
    }

    /// Run a delivery tick now, in line with the timer.
    pub fn trigger_tick(&self) {
        self.scheduler.trigger_now();
    }

    /// Stop scheduled delivery. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

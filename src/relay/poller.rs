//! Relay core: subscription management, on-demand fetches and scheduled
//! ticks over a shared database, feed source and delivery sink.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::db::Database;
use crate::delivery::{deliver, DeliveryOutcome, DeliverySink, DeliveryUnit};
use crate::feed::{DiffReport, FeedDiffer, FeedSource, FetchOutcome, SeenEntryRepository};
use crate::scheduler::TickHandler;
use crate::subscription::{AddResult, ChannelId, NewSubscription, SubscriptionRepository};
use crate::Result;

/// What one source produced during an on-demand fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    /// Subscription name.
    pub name: String,
    /// Source URL.
    pub url: String,
    /// New entries, in feed order.
    pub units: Vec<DeliveryUnit>,
    /// One outcome per unit; a single outcome for the "no new entries"
    /// notice when `units` is empty.
    pub outcomes: Vec<DeliveryOutcome>,
}

/// Result of an on-demand fetch for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchNowReport {
    /// The channel has no subscriptions; nothing was fetched.
    NoSubscriptions,
    /// Per-source results, ordered by subscription name.
    Delivered(Vec<SourceReport>),
}

/// Counters for one scheduled tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Channels with at least one subscription.
    pub channels: usize,
    /// Distinct source URLs fetched.
    pub sources_polled: usize,
    /// Sources whose fetch failed.
    pub failed_sources: usize,
    /// Units that reached their channel.
    pub delivered: usize,
    /// Units dropped after both send attempts failed.
    pub dropped: usize,
    /// Failure notices sent to channels.
    pub alerts: usize,
    /// Seen entries removed by retention.
    pub pruned: u64,
}

/// Text of the notice sent when a channel asks for news and a source has none.
pub fn no_news_notice(name: &str) -> String {
    format!("No new entries in '{}'.", name)
}

fn failure_notice(name: &str, url: &str, streak: u32, error: &str) -> String {
    format!(
        "Source '{}' ({}) has failed {} times in a row: {}",
        name, url, streak, error
    )
}

/// The relay core.
pub struct Relay {
    db: Arc<Database>,
    source: Arc<dyn FeedSource>,
    sink: Arc<dyn DeliverySink>,
    config: RelayConfig,
    retention_days: u32,
}

impl Relay {
    /// Create a relay. Seen entries are kept forever unless a retention
    /// period is set.
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn FeedSource>,
        sink: Arc<dyn DeliverySink>,
        config: RelayConfig,
    ) -> Self {
        Self {
            db,
            source,
            sink,
            config,
            retention_days: 0,
        }
    }

    /// Drop seen entries older than `days` after every tick (0 disables).
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    fn subscriptions(&self) -> SubscriptionRepository<'_> {
        SubscriptionRepository::with_limit(self.db.pool(), self.config.max_subscriptions_per_channel)
    }

    fn differ(&self) -> FeedDiffer<'_> {
        FeedDiffer::new(self.db.pool(), self.source.as_ref())
            .with_max_entries(self.config.max_entries_per_poll)
    }

    /// Register a named source for a channel.
    ///
    /// With feed validation enabled, the source is fetched once before it is
    /// stored; capacity and name clashes are reported before that fetch.
    pub async fn register_subscription(
        &self,
        channel_id: ChannelId,
        name: &str,
        url: &str,
    ) -> Result<AddResult> {
        let sub = NewSubscription::new(channel_id, name, url);
        if let Some(reason) = sub.invalid_reason() {
            return Ok(AddResult::Invalid(reason));
        }

        let repo = self.subscriptions();

        if self.config.validate_on_subscribe {
            if repo.count(channel_id).await? as usize >= self.config.max_subscriptions_per_channel
            {
                return Ok(AddResult::AtCapacity);
            }
            if repo.get(channel_id, &sub.name).await?.is_some() {
                return Ok(AddResult::Duplicate);
            }

            match self.source.fetch(&sub.url).await {
                FetchOutcome::Failed(reason) => {
                    debug!("Rejecting {} for channel {}: {}", sub.url, channel_id, reason);
                    return Ok(AddResult::Invalid(format!("not a valid feed: {}", reason)));
                }
                FetchOutcome::Parsed(entries) if entries.is_empty() => {
                    return Ok(AddResult::Invalid("feed has no entries".to_string()));
                }
                FetchOutcome::Parsed(_) => {}
            }
        }

        let result = repo.add(&sub).await?;
        if result.is_added() {
            info!(
                "Channel {} subscribed to '{}' ({})",
                channel_id, sub.name, sub.url
            );
        }
        Ok(result)
    }

    /// Remove a channel's subscription by name.
    pub async fn unregister_subscription(&self, channel_id: ChannelId, name: &str) -> Result<bool> {
        let removed = self.subscriptions().remove(channel_id, name.trim()).await?;
        if removed {
            info!("Channel {} unsubscribed from '{}'", channel_id, name.trim());
        }
        Ok(removed)
    }

    /// List a channel's subscriptions (name -> URL).
    pub async fn list_subscriptions(&self, channel_id: ChannelId) -> Result<BTreeMap<String, String>> {
        self.subscriptions().list(channel_id).await
    }

    /// Fetch every source of one channel now and deliver what is new.
    ///
    /// Sources without news get a plain "no new entries" notice.
    pub async fn fetch_now(&self, channel_id: ChannelId) -> Result<FetchNowReport> {
        let subscriptions = self.list_subscriptions(channel_id).await?;
        if subscriptions.is_empty() {
            return Ok(FetchNowReport::NoSubscriptions);
        }

        let differ = self.differ();
        let mut reports = Vec::with_capacity(subscriptions.len());

        for (name, url) in subscriptions {
            let report = differ.diff(&url).await?;

            let outcomes = if report.units.is_empty() {
                let notice = DeliveryUnit::plain(no_news_notice(&name));
                vec![deliver(self.sink.as_ref(), channel_id, &notice).await]
            } else {
                let mut outcomes = Vec::with_capacity(report.units.len());
                for unit in &report.units {
                    outcomes.push(deliver(self.sink.as_ref(), channel_id, unit).await);
                }
                outcomes
            };

            reports.push(SourceReport {
                name,
                url,
                units: report.units,
                outcomes,
            });
        }

        Ok(FetchNowReport::Delivered(reports))
    }

    /// Run one scheduled pass over every subscription.
    ///
    /// Each source URL is fetched once per tick and its new entries go to
    /// every channel subscribed to it. Fetch and delivery failures are
    /// logged and skipped; a storage error ends the tick.
    pub async fn run_tick(&self) -> Result<TickSummary> {
        let all = self.subscriptions().list_all().await?;
        let differ = self.differ();

        let mut summary = TickSummary {
            channels: all.len(),
            ..Default::default()
        };
        let mut reports: HashMap<String, DiffReport> = HashMap::new();

        for (channel_id, subscriptions) in &all {
            for (name, url) in subscriptions {
                let polled_now = !reports.contains_key(url);
                if polled_now {
                    let report = differ.diff(url).await?;
                    summary.sources_polled += 1;
                    if report.fetch_error.is_some() {
                        summary.failed_sources += 1;
                    }
                    reports.insert(url.clone(), report);
                }
                let Some(report) = reports.get(url) else {
                    continue;
                };

                if let Some(error) = &report.fetch_error {
                    let threshold = self.config.failure_alert_threshold;
                    if threshold > 0 && report.failure_streak == threshold {
                        let notice = DeliveryUnit::plain(failure_notice(
                            name,
                            url,
                            report.failure_streak,
                            error,
                        ));
                        if deliver(self.sink.as_ref(), *channel_id, &notice)
                            .await
                            .is_delivered()
                        {
                            summary.alerts += 1;
                        }
                    }
                    continue;
                }

                for unit in &report.units {
                    match deliver(self.sink.as_ref(), *channel_id, unit).await {
                        DeliveryOutcome::Dropped => summary.dropped += 1,
                        _ => summary.delivered += 1,
                    }
                }
            }
        }

        if self.retention_days > 0 {
            let cutoff = Utc::now() - ChronoDuration::days(i64::from(self.retention_days));
            summary.pruned = SeenEntryRepository::new(self.db.pool())
                .prune_older_than(cutoff)
                .await?;
        }

        Ok(summary)
    }
}

#[async_trait]
impl TickHandler for Relay {
    async fn tick(&self) {
        debug!("Running delivery tick");
        match self.run_tick().await {
            Ok(summary) => {
                if summary.delivered > 0 || summary.dropped > 0 {
                    info!(
                        "Tick done: {} delivered, {} dropped, {} source(s) polled",
                        summary.delivered, summary.dropped, summary.sources_polled
                    );
                } else {
                    debug!("Tick done: nothing new from {} source(s)", summary.sources_polled);
                }
                if summary.failed_sources > 0 {
                    warn!("{} source(s) failed to fetch", summary.failed_sources);
                }
                if summary.pruned > 0 {
                    info!("Pruned {} seen entries", summary.pruned);
                }
            }
            Err(e) => error!("Delivery tick aborted: {}", e),
        }
    }
}

//! Subscription repository for newsrelay.

use std::collections::BTreeMap;

use chrono::Utc;

use super::types::{AddResult, ChannelId, NewSubscription, Subscription, DEFAULT_MAX_SUBSCRIPTIONS};
use crate::db::{parse_timestamp, DbPool};
use crate::Result;

/// Row type for a subscription from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    channel_id: i64,
    name: String,
    url: String,
    created_at: String,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            id: row.id,
            channel_id: row.channel_id,
            name: row.name,
            url: row.url,
            created_at: parse_timestamp(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for subscription operations.
///
/// Every mutation is a single SQL statement, so concurrent callers (the
/// scheduler tick and user requests) can't observe or leave partial state.
pub struct SubscriptionRepository<'a> {
    pool: &'a DbPool,
    max_per_channel: usize,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new repository instance with the default channel limit.
    pub fn new(pool: &'a DbPool) -> Self {
        Self {
            pool,
            max_per_channel: DEFAULT_MAX_SUBSCRIPTIONS,
        }
    }

    /// Create a repository enforcing a custom per-channel limit.
    pub fn with_limit(pool: &'a DbPool, max_per_channel: usize) -> Self {
        Self {
            pool,
            max_per_channel,
        }
    }

    /// Register a subscription.
    ///
    /// The capacity check and the insert happen in one statement. When
    /// nothing was inserted the outcome is `AtCapacity` if the channel is
    /// full, otherwise `Duplicate`.
    pub async fn add(&self, sub: &NewSubscription) -> Result<AddResult> {
        if let Some(reason) = sub.invalid_reason() {
            return Ok(AddResult::Invalid(reason));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (channel_id, name, url)
            SELECT $1, $2, $3
            WHERE (SELECT COUNT(*) FROM subscriptions WHERE channel_id = $4) < $5
            ON CONFLICT (channel_id, name) DO NOTHING
            "#,
        )
        .bind(sub.channel_id)
        .bind(&sub.name)
        .bind(&sub.url)
        .bind(sub.channel_id)
        .bind(self.max_per_channel as i64)
        .execute(self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(AddResult::Added);
        }

        if self.count(sub.channel_id).await? >= self.max_per_channel as i64 {
            Ok(AddResult::AtCapacity)
        } else {
            Ok(AddResult::Duplicate)
        }
    }

    /// Remove a subscription by name. Returns false if none matched.
    pub async fn remove(&self, channel_id: ChannelId, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE channel_id = $1 AND name = $2")
            .bind(channel_id)
            .bind(name.trim())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get one subscription.
    pub async fn get(&self, channel_id: ChannelId, name: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, channel_id, name, url, created_at
            FROM subscriptions
            WHERE channel_id = $1 AND name = $2
            "#,
        )
        .bind(channel_id)
        .bind(name.trim())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Subscription::from))
    }

    /// List a channel's subscriptions as name -> URL.
    pub async fn list(&self, channel_id: ChannelId) -> Result<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, url FROM subscriptions WHERE channel_id = $1")
                .bind(channel_id)
                .fetch_all(self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    /// List every subscription grouped by channel.
    pub async fn list_all(&self) -> Result<BTreeMap<ChannelId, BTreeMap<String, String>>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT channel_id, name, url FROM subscriptions ORDER BY id ASC")
                .fetch_all(self.pool)
                .await?;

        let mut all: BTreeMap<ChannelId, BTreeMap<String, String>> = BTreeMap::new();
        for (channel_id, name, url) in rows {
            all.entry(channel_id).or_default().insert(name, url);
        }
        Ok(all)
    }

    /// List subscriptions (channel, name) pointing at a source URL.
    pub async fn list_by_url(&self, url: &str) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, channel_id, name, url, created_at
            FROM subscriptions
            WHERE url = $1
            ORDER BY id ASC
            "#,
        )
        .bind(url)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    /// Count a channel's subscriptions.
    pub async fn count(&self, channel_id: ChannelId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE channel_id = $1")
            .bind(channel_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// List channels with at least one subscription.
    pub async fn channels(&self) -> Result<Vec<ChannelId>> {
        let channels: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT channel_id FROM subscriptions ORDER BY channel_id")
                .fetch_all(self.pool)
                .await?;
        Ok(channels)
    }
}

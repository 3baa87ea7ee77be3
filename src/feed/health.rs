//! Per-source fetch health.
//!
//! Tracks consecutive fetch failures so persistent misconfiguration can be
//! reported instead of looking like a quiet feed forever.

use chrono::{DateTime, Utc};

use crate::db::{format_timestamp, parse_timestamp, DbPool};
use crate::Result;

/// Fetch health of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHealth {
    /// Source URL.
    pub source_url: String,
    /// Consecutive failed fetches (0 after a success).
    pub failure_streak: u32,
    /// Most recent failure reason.
    pub last_error: Option<String>,
    /// When the last failure happened.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// When the last successful fetch happened.
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SourceHealthRow {
    source_url: String,
    failure_streak: i64,
    last_error: Option<String>,
    last_failure_at: Option<String>,
    last_success_at: Option<String>,
}

impl From<SourceHealthRow> for SourceHealth {
    fn from(row: SourceHealthRow) -> Self {
        SourceHealth {
            source_url: row.source_url,
            failure_streak: row.failure_streak.max(0) as u32,
            last_error: row.last_error,
            last_failure_at: row.last_failure_at.and_then(|s| parse_timestamp(&s)),
            last_success_at: row.last_success_at.and_then(|s| parse_timestamp(&s)),
        }
    }
}

/// Repository for source health.
pub struct SourceHealthRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SourceHealthRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Record a failed fetch and return the new streak length.
    pub async fn record_failure(&self, source_url: &str, error: &str) -> Result<u32> {
        let now = format_timestamp(&Utc::now());
        let streak: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO source_health (source_url, failure_streak, last_error, last_failure_at)
            VALUES ($1, 1, $2, $3)
            ON CONFLICT (source_url) DO UPDATE SET
                failure_streak = failure_streak + 1,
                last_error = excluded.last_error,
                last_failure_at = excluded.last_failure_at
            RETURNING failure_streak
            "#,
        )
        .bind(source_url)
        .bind(error)
        .bind(&now)
        .fetch_one(self.pool)
        .await?;

        Ok(streak.max(0) as u32)
    }

    /// Record a successful fetch, resetting the streak.
    pub async fn record_success(&self, source_url: &str) -> Result<()> {
        let now = format_timestamp(&Utc::now());
        sqlx::query(
            r#"
            INSERT INTO source_health (source_url, failure_streak, last_success_at)
            VALUES ($1, 0, $2)
            ON CONFLICT (source_url) DO UPDATE SET
                failure_streak = 0,
                last_success_at = excluded.last_success_at
            "#,
        )
        .bind(source_url)
        .bind(&now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Get the health of a source (None if never fetched).
    pub async fn get(&self, source_url: &str) -> Result<Option<SourceHealth>> {
        let row = sqlx::query_as::<_, SourceHealthRow>(
            r#"
            SELECT source_url, failure_streak, last_error, last_failure_at, last_success_at
            FROM source_health
            WHERE source_url = $1
            "#,
        )
        .bind(source_url)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(SourceHealth::from))
    }
}

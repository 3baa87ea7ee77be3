//! Seen-entry store.
//!
//! Records which (source URL, entry id) pairs were already delivered. The
//! history is global: every channel subscribed to a source shares it.

use chrono::{DateTime, Utc};

use crate::db::{format_timestamp, parse_timestamp, DbPool};
use crate::Result;

/// A delivered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenEntry {
    /// Source the entry came from.
    pub source_url: String,
    /// Entry identifier (native id or link).
    pub entry_id: String,
    /// When the entry was first detected.
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SeenEntryRow {
    source_url: String,
    entry_id: String,
    first_seen_at: String,
}

impl From<SeenEntryRow> for SeenEntry {
    fn from(row: SeenEntryRow) -> Self {
        SeenEntry {
            source_url: row.source_url,
            entry_id: row.entry_id,
            first_seen_at: parse_timestamp(&row.first_seen_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for seen-entry operations.
pub struct SeenEntryRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SeenEntryRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// True iff the entry has never been recorded for this source.
    pub async fn is_new(&self, source_url: &str, entry_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM seen_entries WHERE source_url = $1 AND entry_id = $2)",
        )
        .bind(source_url)
        .bind(entry_id)
        .fetch_one(self.pool)
        .await?;

        Ok(!exists)
    }

    /// Record an entry as seen.
    ///
    /// Insert-if-absent in one statement: a duplicate is a no-op. Returns
    /// true only for the caller that actually inserted the row, so two
    /// pollers racing on the same entry can't both claim it.
    pub async fn mark_seen(
        &self,
        source_url: &str,
        entry_id: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO seen_entries (source_url, entry_id, first_seen_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_url, entry_id) DO NOTHING
            "#,
        )
        .bind(source_url)
        .bind(entry_id)
        .bind(format_timestamp(&seen_at))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a seen entry.
    pub async fn get(&self, source_url: &str, entry_id: &str) -> Result<Option<SeenEntry>> {
        let row = sqlx::query_as::<_, SeenEntryRow>(
            r#"
            SELECT source_url, entry_id, first_seen_at
            FROM seen_entries
            WHERE source_url = $1 AND entry_id = $2
            "#,
        )
        .bind(source_url)
        .bind(entry_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(SeenEntry::from))
    }

    /// Number of entries recorded for a source.
    pub async fn count_for_source(&self, source_url: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM seen_entries WHERE source_url = $1")
                .bind(source_url)
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Delete entries first seen before `cutoff`. Returns the number removed.
    ///
    /// A pruned entry that is still within a source's most recent items
    /// will be delivered again, so the retention window should be much
    /// longer than the poll interval.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM seen_entries WHERE first_seen_at < $1")
            .bind(format_timestamp(&cutoff))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

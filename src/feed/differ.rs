//! Feed differ.
//!
//! Fetches a source, keeps the first few entries, and turns the ones not
//! seen before into delivery units, marking them seen as it goes.

use chrono::Utc;
use tracing::{debug, warn};

use crate::db::DbPool;
use crate::delivery::DeliveryUnit;
use crate::feed::fetcher::FeedSource;
use crate::feed::health::SourceHealthRepository;
use crate::feed::seen::SeenEntryRepository;
use crate::feed::types::{FetchOutcome, PolledEntry, DEFAULT_MAX_ENTRIES_PER_POLL};
use crate::Result;

/// Characters with a meaning in the target markup; escaped with a backslash.
const MARKDOWN_SPECIAL: &[char] = &[
    '\\', '*', '_', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape every markup-significant character in `text`.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if MARKDOWN_SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Format an entry as a delivery unit: bold title, then the link.
pub fn format_entry(entry: &PolledEntry) -> DeliveryUnit {
    let link = entry.link.as_deref().unwrap_or_default();
    let markup = format!("*{}*\n{}", escape_markdown(&entry.title), link);
    let plain = format!("{}\n{}", entry.title, link);
    DeliveryUnit::markup(markup.trim_end(), plain.trim_end())
}

/// Result of diffing one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// New entries, in feed order.
    pub units: Vec<DeliveryUnit>,
    /// Why the fetch failed, if it did.
    pub fetch_error: Option<String>,
    /// Consecutive failures for this source, after this poll.
    pub failure_streak: u32,
}

impl DiffReport {
    /// Whether the poll found nothing new (including failed fetches).
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Computes the new entries of a source against the seen-entry store.
pub struct FeedDiffer<'a> {
    pool: &'a DbPool,
    source: &'a dyn FeedSource,
    max_entries: usize,
}

impl<'a> FeedDiffer<'a> {
    /// Create a differ considering the default number of entries per poll.
    pub fn new(pool: &'a DbPool, source: &'a dyn FeedSource) -> Self {
        Self {
            pool,
            source,
            max_entries: DEFAULT_MAX_ENTRIES_PER_POLL,
        }
    }

    /// Set how many of the most recent entries are considered per poll.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Poll a source and return its new entries.
    ///
    /// A failed fetch is not an error: it yields an empty report carrying
    /// the reason. Only storage failures are returned as `Err`.
    pub async fn diff(&self, source_url: &str) -> Result<DiffReport> {
        let health = SourceHealthRepository::new(self.pool);

        let entries = match self.source.fetch(source_url).await {
            FetchOutcome::Parsed(entries) => entries,
            FetchOutcome::Failed(reason) => {
                warn!("Fetch failed for {}: {}", source_url, reason);
                let failure_streak = health.record_failure(source_url, &reason).await?;
                return Ok(DiffReport {
                    units: Vec::new(),
                    fetch_error: Some(reason),
                    failure_streak,
                });
            }
        };
        health.record_success(source_url).await?;

        let seen = SeenEntryRepository::new(self.pool);
        let mut units = Vec::new();

        for entry in entries.iter().take(self.max_entries) {
            let Some(entry_id) = entry.entry_id() else {
                debug!("Skipping entry without id, link or title from {}", source_url);
                continue;
            };

            if !seen.is_new(source_url, &entry_id).await? {
                continue;
            }

            // The insert is the claim; a concurrent poll that got here
            // first already owns this entry.
            if seen.mark_seen(source_url, &entry_id, Utc::now()).await? {
                units.push(format_entry(entry));
            }
        }

        debug!("{} new entries from {}", units.len(), source_url);
        Ok(DiffReport {
            units,
            fetch_error: None,
            failure_streak: 0,
        })
    }
}

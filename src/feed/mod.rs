//! Feed polling for newsrelay.
//!
//! Fetching and parsing sources, remembering which entries were already
//! delivered, and computing the new ones on each poll.

pub mod differ;
pub mod fetcher;
pub mod health;
pub mod seen;
pub mod types;

pub use differ::{escape_markdown, format_entry, DiffReport, FeedDiffer};
pub use fetcher::{validate_url, FeedSource, HttpFeedSource};
pub use health::{SourceHealth, SourceHealthRepository};
pub use seen::{SeenEntry, SeenEntryRepository};
pub use types::{FetchOutcome, PolledEntry, DEFAULT_MAX_ENTRIES_PER_POLL};

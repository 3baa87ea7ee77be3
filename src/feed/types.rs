//! Feed types for newsrelay.

/// Number of most recent entries considered per poll.
pub const DEFAULT_MAX_ENTRIES_PER_POLL: usize = 5;

/// One entry of a freshly fetched feed.
///
/// Only lives for a single poll; what gets persisted is its entry id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledEntry {
    /// Native identifier (RSS guid / Atom id), if the source provides one.
    pub id: Option<String>,
    /// Plain-text title.
    pub title: String,
    /// Link to the original article.
    pub link: Option<String>,
}

impl PolledEntry {
    /// Create an entry with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            link: None,
        }
    }

    /// Set the native identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Identifier used for deduplication.
    ///
    /// The native id when present, else the link, else the title. Returns
    /// `None` for an entry with nothing stable to key on.
    pub fn entry_id(&self) -> Option<String> {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        non_empty(&self.id)
            .or_else(|| non_empty(&self.link))
            .or_else(|| {
                let title = self.title.trim();
                (!title.is_empty()).then(|| format!("title:{}", title))
            })
    }
}

/// Result of fetching a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Entries in the source's native order (usually newest first).
    Parsed(Vec<PolledEntry>),
    /// The source couldn't be fetched or isn't a valid feed.
    Failed(String),
}

impl FetchOutcome {
    /// Whether the fetch produced a feed.
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchOutcome::Parsed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_prefers_native_id() {
        let entry = PolledEntry::new("Title")
            .with_id("guid-1")
            .with_link("https://example.com/1");
        assert_eq!(entry.entry_id(), Some("guid-1".to_string()));
    }

    #[test]
    fn test_entry_id_falls_back_to_link() {
        let entry = PolledEntry::new("Title").with_link("https://example.com/1");
        assert_eq!(entry.entry_id(), Some("https://example.com/1".to_string()));

        // Blank ids count as missing
        let entry = PolledEntry::new("Title")
            .with_id("   ")
            .with_link("https://example.com/1");
        assert_eq!(entry.entry_id(), Some("https://example.com/1".to_string()));
    }

    #[test]
    fn test_entry_id_is_stable() {
        let a = PolledEntry::new("Same").with_link("https://example.com/x");
        let b = PolledEntry::new("Same").with_link("https://example.com/x");
        assert_eq!(a.entry_id(), b.entry_id());
    }

    #[test]
    fn test_entry_id_title_fallback() {
        assert_eq!(
            PolledEntry::new("Only a title").entry_id(),
            Some("title:Only a title".to_string())
        );
        assert_eq!(PolledEntry::new("  ").entry_id(), None);
    }

    #[test]
    fn test_fetch_outcome_is_ok() {
        assert!(FetchOutcome::Parsed(vec![]).is_ok());
        assert!(!FetchOutcome::Failed("bad xml".into()).is_ok());
    }
}

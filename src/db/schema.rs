//! Database schema and migrations for newsrelay.
//!
//! Migrations are applied in order; the schema_version table tracks
//! which ones have already run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Subscriptions and seen entries
    r#"
-- Named feed sources registered per channel
CREATE TABLE subscriptions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id  INTEGER NOT NULL,
    name        TEXT NOT NULL,
    url         TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(channel_id, name)
);

CREATE INDEX idx_subscriptions_channel ON subscriptions(channel_id);
CREATE INDEX idx_subscriptions_url ON subscriptions(url);

-- Entries already delivered, shared by every channel subscribed to a source
CREATE TABLE seen_entries (
    source_url     TEXT NOT NULL,
    entry_id       TEXT NOT NULL,
    first_seen_at  TEXT NOT NULL,
    UNIQUE(source_url, entry_id)
);

CREATE INDEX idx_seen_entries_first_seen ON seen_entries(first_seen_at);
"#,
    // v2: Per-source fetch health
    r#"
CREATE TABLE source_health (
    source_url       TEXT PRIMARY KEY,
    failure_streak   INTEGER NOT NULL DEFAULT 0,
    last_error       TEXT,
    last_failure_at  TEXT,
    last_success_at  TEXT
);
"#,
];

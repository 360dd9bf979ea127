//! SQLite schema for every durable store the engine owns.

/// Applied on every open; all statements are idempotent.
pub const SCHEMA: &str = r#"
-- Generations of the content cache. At most one row may be 'current'.
CREATE TABLE IF NOT EXISTS generations (
    tag TEXT PRIMARY KEY,
    state TEXT NOT NULL CHECK (state IN ('pending', 'current', 'stale')),
    first_seen TEXT NOT NULL DEFAULT (datetime('now')),
    activated_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_generations_single_current
    ON generations(state) WHERE state = 'current';

-- Request -> response pairs, partitioned by generation
CREATE TABLE IF NOT EXISTS content_cache (
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    path TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_hash),
    FOREIGN KEY (generation) REFERENCES generations(tag) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_content_cache_path
    ON content_cache(generation, path);

-- Last full snapshot of each mirrored collection
CREATE TABLE IF NOT EXISTS mirror_snapshots (
    resource_key TEXT PRIMARY KEY,
    envelope BLOB NOT NULL,
    record_count INTEGER NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Pending offline mutations. AUTOINCREMENT keeps ids from ever being reused.
CREATE TABLE IF NOT EXISTS mutation_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK (kind IN ('create', 'update', 'delete')),
    target_path TEXT NOT NULL,
    payload BLOB,
    enqueued_at TEXT NOT NULL
);
"#;

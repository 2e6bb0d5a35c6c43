/// Schema for the durable store shared by cache tiers and queues.
pub const SCHEMA: &str = r#"
-- Live cache tiers (one row per versioned tier name)
CREATE TABLE IF NOT EXISTS cache_tiers (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Captured responses, keyed by normalized request identity
CREATE TABLE IF NOT EXISTS cache_entries (
    tier TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (tier, request_hash)
);

-- Pending mutations; id order is replay order
CREATE TABLE IF NOT EXISTS queue_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    -- Original request URL; NULL replays to the queue's endpoint
    target TEXT,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_queue_records_queue ON queue_records(queue, id);
"#;

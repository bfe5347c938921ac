// src/storage/schema.rs

pub const SCHEMA: &str = r#"
-- subscribers
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    username TEXT NOT NULL DEFAULT ''
);

-- watched items (one row per external document, never deleted)
CREATE TABLE IF NOT EXISTS items (
    doc_id INTEGER PRIMARY KEY,
    doc TEXT NOT NULL,                 -- JSON snapshot of the document
    schedule_key TEXT NOT NULL,        -- sortable due-time key or '-' sentinel
    attempts INTEGER NOT NULL DEFAULT 0,
    enqueued_at INTEGER NOT NULL,
    last_diff TEXT                     -- JSON of the most recent diff
);

CREATE INDEX IF NOT EXISTS idx_items_schedule_key ON items(schedule_key);

-- watch relation: user watch set and item watcher set are the same rows,
-- so the two sides can never contradict each other
CREATE TABLE IF NOT EXISTS watches (
    user_id TEXT NOT NULL REFERENCES users(id),
    doc_id INTEGER NOT NULL REFERENCES items(doc_id),
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, doc_id)
);

CREATE INDEX IF NOT EXISTS idx_watches_doc_id ON watches(doc_id);

-- alerts, created pending by the scanner, settled once by the dispatcher
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    doc_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    diff TEXT NOT NULL,                -- JSON
    text TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    delivered_at INTEGER NOT NULL DEFAULT 0,
    result TEXT
);

CREATE INDEX IF NOT EXISTS idx_alerts_pending ON alerts(delivered_at, created_at);

-- resumable scan tasks; at most one row with finalized_at = 0
CREATE TABLE IF NOT EXISTS scan_tasks (
    id TEXT PRIMARY KEY,
    from_key TEXT NOT NULL,
    to_key TEXT NOT NULL,
    page_size INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    finalized_at INTEGER NOT NULL DEFAULT 0,
    items_processed INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_scan_tasks_active ON scan_tasks(finalized_at);

-- singleton state rows (scan watermark lives under key 'swept_to')
CREATE TABLE IF NOT EXISTS system (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- command rate limits keyed by (subscriber, action)
CREATE TABLE IF NOT EXISTS ratelimits (
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    deadline INTEGER NOT NULL,
    PRIMARY KEY (user_id, action)
);
"#;

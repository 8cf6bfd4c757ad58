//! v001 -- Initial schema creation.
//!
//! Creates `threads` and `updates`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Threads
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS threads (
    id         TEXT PRIMARY KEY NOT NULL,     -- base58 peer id of the thread key
    name       TEXT NOT NULL UNIQUE,
    phrase     TEXT NOT NULL,
    secret     TEXT NOT NULL,                 -- hex-encoded 32-byte Ed25519 secret
    created_at TEXT NOT NULL                  -- RFC-3339
);

-- ----------------------------------------------------------------
-- Updates
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS updates (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    content_id TEXT NOT NULL UNIQUE,
    prev_id    TEXT NOT NULL,                 -- empty string marks genesis
    thread_id  TEXT NOT NULL,
    metadata   TEXT NOT NULL,                 -- JSON
    caption    TEXT,
    is_local   INTEGER NOT NULL DEFAULT 0,
    indexed_at TEXT NOT NULL,

    FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_updates_thread_seq
    ON updates (thread_id, seq DESC);

CREATE INDEX IF NOT EXISTS idx_updates_thread_local
    ON updates (thread_id, is_local, seq DESC);
"#;

/// Apply the migration.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}

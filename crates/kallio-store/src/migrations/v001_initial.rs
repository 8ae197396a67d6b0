//! v001 -- Initial schema creation.
//!
//! Creates the chat log and the preference table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages (append-only chat log)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,  -- never reused
    body      TEXT NOT NULL DEFAULT '',
    photoPath TEXT,                               -- nullable attachment path
    timestamp INTEGER NOT NULL                    -- ms since Unix epoch
);

-- ----------------------------------------------------------------
-- Preferences (key-value, grouped by namespace)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS preferences (
    namespace TEXT NOT NULL,
    key       TEXT NOT NULL,
    value     TEXT NOT NULL,

    PRIMARY KEY (namespace, key)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.
//!
//! Every connection runs in WAL mode with `synchronous = FULL`, so a
//! committed write has reached stable storage by the time `execute` returns.
//! The message writer and the profile store each hold their own connection to
//! the same file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database described by `config`, creating the
    /// data directory if needed.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.database_path();
        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path, Duration::from_millis(config.busy_timeout_ms))
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at(dir.path().join("nested"));

        let db = Database::open(&config).expect("should open");
        assert!(db.path().is_some());
        assert!(config.database_path().exists());
    }

    #[test]
    fn two_connections_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at(dir.path());

        let first = Database::open(&config).unwrap();
        let second = Database::open(&config).unwrap();

        first
            .conn()
            .execute(
                "INSERT INTO preferences (namespace, key, value) VALUES ('ns', 'k', 'v')",
                [],
            )
            .unwrap();

        let value: String = second
            .conn()
            .query_row(
                "SELECT value FROM preferences WHERE namespace = 'ns' AND key = 'k'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "v");
    }
}

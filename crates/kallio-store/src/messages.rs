use chrono::Utc;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChatEntry, NewEntry};

impl Database {
    /// Validate and insert a new entry, stamping it with the current time.
    ///
    /// The row is committed (and, with `synchronous = FULL`, on disk) when
    /// this returns `Ok`.
    pub fn insert_message(&self, entry: &NewEntry) -> Result<ChatEntry> {
        let (body, image_path) = entry.validate()?;
        let created_at = Utc::now().timestamp_millis();

        self.conn().execute(
            "INSERT INTO messages (body, photoPath, timestamp) VALUES (?1, ?2, ?3)",
            params![body, image_path, created_at],
        )?;

        Ok(ChatEntry {
            id: self.conn().last_insert_rowid(),
            text: body,
            image_path,
            created_at,
        })
    }

    /// All entries, oldest first, ties broken by insertion order.
    pub fn list_messages(&self) -> Result<Vec<ChatEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, body, photoPath, timestamp
             FROM messages
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map([], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Every attachment path referenced by a stored entry, read from disk
    /// rather than from any in-memory snapshot.
    pub fn message_image_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT photoPath FROM messages WHERE photoPath IS NOT NULL")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatEntry> {
    Ok(ChatEntry {
        id: row.get(0)?,
        text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        image_path: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&StoreConfig::at(dir.path())).unwrap();
        (dir, db)
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let (_dir, db) = open_temp();

        let first = db.insert_message(&NewEntry::text("hello")).unwrap();
        let second = db.insert_message(&NewEntry::image("/img/a.jpg")).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.text, "");
        assert!(second.created_at >= first.created_at);
        assert_eq!(db.list_messages().unwrap(), vec![first, second]);
    }

    #[test]
    fn invalid_entry_is_not_written() {
        let (_dir, db) = open_temp();

        let err = db.insert_message(&NewEntry::default()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidEntry(_)));
        assert!(db.list_messages().unwrap().is_empty());
    }

    #[test]
    fn list_breaks_timestamp_ties_by_id() {
        let (_dir, db) = open_temp();

        // Same timestamp for all three rows, inserted out of id order.
        for (id, body) in [(3, "c"), (1, "a"), (2, "b")] {
            db.conn()
                .execute(
                    "INSERT INTO messages (id, body, photoPath, timestamp) VALUES (?1, ?2, NULL, 42)",
                    params![id, body],
                )
                .unwrap();
        }
        db.conn()
            .execute(
                "INSERT INTO messages (id, body, photoPath, timestamp) VALUES (4, 'early', NULL, 7)",
                [],
            )
            .unwrap();

        let bodies: Vec<String> = db
            .list_messages()
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(bodies, vec!["early", "a", "b", "c"]);
    }

    #[test]
    fn image_paths_skip_text_entries() {
        let (_dir, db) = open_temp();
        db.insert_message(&NewEntry::text("no photo")).unwrap();
        db.insert_message(&NewEntry::image("/img/x.jpg")).unwrap();

        assert_eq!(db.message_image_paths().unwrap(), vec!["/img/x.jpg"]);
    }
}

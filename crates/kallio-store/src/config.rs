//! Store configuration loaded from environment variables.
//!
//! Every setting has a default so the store can be opened with zero
//! configuration during development and in tests.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the database file and the attachment files.
    /// Env: `KALLIO_DATA_DIR`
    /// Default: platform data directory, or `./kallio-data` if none exists.
    pub data_dir: PathBuf,

    /// File name of the SQLite database inside `data_dir`.
    /// Env: `KALLIO_DATABASE_FILE`
    /// Default: `kallio.db`
    pub database_file: String,

    /// Preference namespace holding the profile record.
    /// Env: `KALLIO_PREFS_NAMESPACE`
    /// Default: `user_prefs`
    pub prefs_namespace: String,

    /// Capacity of the writer worker's request queue.
    /// Env: `KALLIO_QUEUE_CAPACITY`
    /// Default: `256`
    pub queue_capacity: usize,

    /// How long a connection waits on a locked database before failing.
    /// Env: `KALLIO_BUSY_TIMEOUT_MS`
    /// Default: `5000`
    pub busy_timeout_ms: u64,
}

pub const DEFAULT_DATABASE_FILE: &str = "kallio.db";
pub const DEFAULT_PREFS_NAMESPACE: &str = "user_prefs";
const ATTACHMENTS_SUBDIR: &str = "files";

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            prefs_namespace: DEFAULT_PREFS_NAMESPACE.to_string(),
            queue_capacity: 256,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Configuration rooted at an explicit directory, everything else default.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("KALLIO_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Ok(file) = std::env::var("KALLIO_DATABASE_FILE") {
            if is_plain_file_name(&file) {
                config.database_file = file;
            } else {
                tracing::warn!(value = %file, "Invalid KALLIO_DATABASE_FILE, using default");
            }
        }

        if let Ok(ns) = std::env::var("KALLIO_PREFS_NAMESPACE") {
            if !ns.trim().is_empty() {
                config.prefs_namespace = ns;
            }
        }

        if let Ok(val) = std::env::var("KALLIO_QUEUE_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.queue_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid KALLIO_QUEUE_CAPACITY, using default"),
            }
        }

        if let Ok(val) = std::env::var("KALLIO_BUSY_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.busy_timeout_ms = ms,
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid KALLIO_BUSY_TIMEOUT_MS, using default")
                }
            }
        }

        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir.join(ATTACHMENTS_SUBDIR)
    }

    /// Lock file held by the one message writer allowed on the database.
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.lock", self.database_file))
    }
}

/// Platform data directory:
/// - Linux:   `~/.local/share/kallio`
/// - macOS:   `~/Library/Application Support/com.kallio.kallio`
/// - Windows: `{FOLDERID_RoamingAppData}\kallio\kallio\data`
fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "kallio", "kallio")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./kallio-data"))
}

fn is_plain_file_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.file_name().map(|f| f == path.as_os_str()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.database_file, "kallio.db");
        assert_eq!(config.prefs_namespace, "user_prefs");
        assert_eq!(config.queue_capacity, 256);
    }

    #[test]
    fn test_derived_paths() {
        let config = StoreConfig::at("/tmp/kallio-test");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/kallio-test/kallio.db")
        );
        assert_eq!(
            config.attachments_dir(),
            PathBuf::from("/tmp/kallio-test/files")
        );
        assert_eq!(
            config.lock_path(),
            PathBuf::from("/tmp/kallio-test/kallio.db.lock")
        );
    }

    #[test]
    fn test_plain_file_name() {
        assert!(is_plain_file_name("chat.db"));
        assert!(!is_plain_file_name("../chat.db"));
        assert!(!is_plain_file_name("a/b.db"));
        assert!(!is_plain_file_name(""));
    }
}

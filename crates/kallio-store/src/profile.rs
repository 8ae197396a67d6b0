//! The per-installation user profile.
//!
//! The profile lives in a preference namespace under two keys.  Reads and
//! writes are synchronous point operations on a dedicated connection; there
//! is no change notification, callers re-read after writing.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ProfileRecord, DEFAULT_DISPLAY_NAME};

pub const PROFILE_IMAGE_PATH_KEY: &str = "profile_image_path";
pub const USER_NAME_KEY: &str = "user_name";

/// Durable singleton profile record, keyed by preference namespace.
///
/// Image files are only ever deleted when they live in the attachments
/// directory; a reference to any other file is dropped but the file is left
/// alone.
pub struct ProfileStore {
    db: Mutex<Database>,
    namespace: String,
    attachments_dir: PathBuf,
}

impl ProfileStore {
    /// Open a profile store on its own connection to the configured database.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db = Database::open(config)?;
        Ok(Self::new(
            db,
            config.prefs_namespace.clone(),
            config.attachments_dir(),
        ))
    }

    pub fn new(
        db: Database,
        namespace: impl Into<String>,
        attachments_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db: Mutex::new(db),
            namespace: namespace.into(),
            attachments_dir: attachments_dir.into(),
        }
    }

    /// Current profile.  Never fails: unset keys and unreadable rows fall
    /// back to defaults.
    pub fn get_profile(&self) -> ProfileRecord {
        let db = self.db();

        let display_name = match db.get_preference(&self.namespace, USER_NAME_KEY) {
            Ok(Some(name)) => name,
            Ok(None) => DEFAULT_DISPLAY_NAME.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read display name, using default");
                DEFAULT_DISPLAY_NAME.to_string()
            }
        };

        let image_path = match db.get_preference(&self.namespace, PROFILE_IMAGE_PATH_KEY) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read profile image path");
                None
            }
        };

        ProfileRecord {
            display_name,
            image_path,
        }
    }

    pub fn set_display_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidEntry(
                "display name must not be blank".into(),
            ));
        }

        self.db()
            .put_preference(&self.namespace, USER_NAME_KEY, name)?;
        tracing::info!(namespace = %self.namespace, "display name updated");
        Ok(())
    }

    /// Point the profile at a new image.
    ///
    /// The previously referenced file is deleted before the new reference is
    /// written, so a viewer never picks up a stale copy.  A missing old file
    /// is not an error, and a file outside the attachments directory is kept.
    pub fn set_profile_image(&self, path: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(StoreError::InvalidEntry(
                "profile image path must not be blank".into(),
            ));
        }

        let db = self.db();
        if let Some(old) = db.get_preference(&self.namespace, PROFILE_IMAGE_PATH_KEY)? {
            if old != path {
                self.remove_owned_image(Path::new(&old))?;
            }
        }

        db.put_preference(&self.namespace, PROFILE_IMAGE_PATH_KEY, path)?;
        tracing::info!(namespace = %self.namespace, path, "profile image updated");
        Ok(())
    }

    /// Drop the profile image reference and delete its file.
    pub fn clear_profile_image(&self) -> Result<()> {
        let db = self.db();
        if let Some(old) = db.get_preference(&self.namespace, PROFILE_IMAGE_PATH_KEY)? {
            self.remove_owned_image(Path::new(&old))?;
            db.remove_preference(&self.namespace, PROFILE_IMAGE_PATH_KEY)?;
            tracing::info!(namespace = %self.namespace, "profile image cleared");
        }
        Ok(())
    }

    fn remove_owned_image(&self, path: &Path) -> Result<()> {
        let owned = match (path.canonicalize(), self.attachments_dir.canonicalize()) {
            (Ok(path), Ok(dir)) => path.starts_with(dir),
            _ => false,
        };
        if !owned {
            tracing::debug!(path = %path.display(), "previous profile image not in attachments, keeping file");
            return Ok(());
        }
        remove_image_file(path)
    }

    // A panic while holding the lock cannot leave the connection half-updated:
    // every write is a single statement.
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn remove_image_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed previous profile image");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove previous profile image");
            Err(e.into())
        }
    }
}

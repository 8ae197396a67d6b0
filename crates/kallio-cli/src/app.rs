//! Application composition root.
//!
//! [`App`] opens every store exactly once and is handed by reference to the
//! command handlers, which never open storage themselves.

use anyhow::{Context, Result};
use kallio_store::{AttachmentStore, MessageStore, ProfileStore, StoreConfig};

/// The opened stores for one run of the program.
pub struct App {
    pub config: StoreConfig,
    pub messages: MessageStore,
    pub profile: ProfileStore,
    pub attachments: AttachmentStore,
}

impl App {
    pub fn open(config: StoreConfig) -> Result<Self> {
        let messages = MessageStore::open(&config).with_context(|| {
            format!("failed to open message store in {}", config.data_dir.display())
        })?;
        let profile = ProfileStore::open(&config).context("failed to open profile store")?;
        let attachments =
            AttachmentStore::open(&config).context("failed to open attachment store")?;

        tracing::info!(data_dir = %config.data_dir.display(), "stores opened");

        Ok(Self {
            config,
            messages,
            profile,
            attachments,
        })
    }

    /// Stop the message writer, waiting for queued writes to finish.
    pub async fn shutdown(self) {
        if let Err(e) = self.messages.close().await {
            tracing::warn!(error = %e, "message store was already closed");
        }
        tracing::debug!(data_dir = %self.config.data_dir.display(), "stores closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at(dir.path().join("data"));

        let app = App::open(config.clone()).unwrap();
        assert!(config.database_path().exists());
        assert!(config.attachments_dir().is_dir());
        app.shutdown().await;
    }
}

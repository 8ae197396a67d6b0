//! Image attachment commands: picking a file, camera capture, and pruning.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use kallio_store::{AttachmentKind, Database, FileSource, NewEntry, StableImageRef};
use tracing::{info, warn};

use crate::app::App;
use crate::commands::messaging::format_entry;

/// Copy a picked image into the store and append it as a message.
pub async fn photo(app: &App, path: PathBuf) -> Result<()> {
    let image = app
        .attachments
        .persist(FileSource(path.clone()), AttachmentKind::MessagePhoto)
        .await
        .with_context(|| format!("failed to copy {}", path.display()))?;

    append_photo(app, image).await
}

/// Run the camera flow with a stand-in camera that copies `from` into the
/// reserved target.
pub async fn capture(app: &App, from: Option<PathBuf>, deny: bool) -> Result<()> {
    let attachments = app.attachments.clone();

    let captured = tokio::task::spawn_blocking(move || {
        let mut session = attachments.begin_capture(AttachmentKind::MessagePhoto);
        session.run(|| !deny, |target| stand_in_camera(from.as_deref(), target))
    })
    .await
    .context("capture task failed")??;

    match captured {
        Some(image) => append_photo(app, image).await,
        None if deny => bail!("camera permission denied"),
        None => bail!("capture produced no image, nothing was sent"),
    }
}

/// Delete attachment files referenced by neither a message nor the profile.
///
/// References are read from the database itself, not from the writer's
/// in-memory collection, so rows committed by any connection are honoured.
pub fn prune(app: &App) -> Result<()> {
    let db = Database::open(&app.config).context("failed to open database for pruning")?;
    let mut referenced = db
        .message_image_paths()
        .context("failed to read message attachments")?;
    referenced.extend(app.profile.get_profile().image_path);

    let removed = app.attachments.prune_orphans(referenced)?;
    println!("Removed {} orphaned file(s).", removed.len());
    for path in removed {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Append a persisted image as a message, deleting the file again if the
/// append fails so nothing unreferenced is left behind.
async fn append_photo(app: &App, image: StableImageRef) -> Result<()> {
    match app
        .messages
        .append(NewEntry::image(image.to_path_string()))
        .await
    {
        Ok(entry) => {
            info!(id = entry.id, size = image.size, "photo sent");
            println!("{}", format_entry(&entry));
            Ok(())
        }
        Err(e) => {
            remove_quietly(&image.path);
            Err(e).context("photo not sent")
        }
    }
}

fn stand_in_camera(from: Option<&Path>, target: &Path) -> bool {
    let Some(from) = from else {
        return false;
    };
    match fs::copy(from, target) {
        Ok(_) => true,
        Err(e) => {
            warn!(from = %from.display(), error = %e, "stand-in camera failed");
            false
        }
    }
}

pub(crate) fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove attachment");
    }
}

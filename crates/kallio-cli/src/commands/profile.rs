use std::path::PathBuf;

use anyhow::{Context, Result};
use kallio_store::{AttachmentKind, FileSource};

use crate::app::App;
use crate::commands::attachments::remove_quietly;

pub fn show(app: &App) -> Result<()> {
    let profile = app.profile.get_profile();
    println!("Username: {}", profile.display_name);
    match profile.image_path {
        Some(path) => println!("Picture:  {path}"),
        None => println!("Picture:  (none)"),
    }
    Ok(())
}

pub fn set_name(app: &App, name: &str) -> Result<()> {
    app.profile
        .set_display_name(name)
        .context("display name not changed")?;
    show(app)
}

/// Copy `path` in as the new profile picture.  The previous picture file is
/// removed by the profile store; if storing the reference fails, the fresh
/// copy is removed instead.
pub async fn set_image(app: &App, path: PathBuf) -> Result<()> {
    let image = app
        .attachments
        .persist(FileSource(path.clone()), AttachmentKind::ProfilePicture)
        .await
        .with_context(|| format!("failed to copy {}", path.display()))?;

    if let Err(e) = app.profile.set_profile_image(&image.to_path_string()) {
        remove_quietly(&image.path);
        return Err(e).context("profile picture not changed");
    }

    show(app)
}

pub fn clear_image(app: &App) -> Result<()> {
    app.profile
        .clear_profile_image()
        .context("profile picture not removed")?;
    show(app)
}

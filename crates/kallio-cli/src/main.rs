//! # kallio
//!
//! Command-line front end for the Kallio chat store.  Opens the message,
//! profile and attachment stores once and dispatches a single command
//! against them.

mod app;
mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kallio_store::StoreConfig;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;

/// Kallio - local chat history and profile
#[derive(Parser)]
#[command(name = "kallio")]
#[command(about = "Local chat history and profile store", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Data directory (overrides KALLIO_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a text message
    Send {
        /// Message body
        text: String,
    },

    /// Attach an image file as a new message
    Photo {
        /// Image file to copy into the store
        path: PathBuf,
    },

    /// Take a picture with the stand-in camera and attach it
    Capture {
        /// File whose bytes the camera "captures"
        #[arg(long)]
        from: Option<PathBuf>,

        /// Simulate the user refusing camera permission
        #[arg(long)]
        deny: bool,
    },

    /// Print the chat history
    History {
        /// Most recent message first
        #[arg(long)]
        newest_first: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Follow the chat history; every line typed on stdin is sent
    Watch {
        /// Stop after this many updates
        #[arg(long)]
        count: Option<usize>,
    },

    /// Show or edit the profile
    Profile {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },

    /// Delete attachment files nothing refers to
    Prune,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Show the current profile
    Show,
    /// Change the display name
    SetName { name: String },
    /// Replace the profile picture with an image file
    SetImage { path: PathBuf },
    /// Remove the profile picture
    ClearImage,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "kallio=debug,kallio_store=debug,warn"
    } else {
        "kallio=info,kallio_store=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut config = StoreConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    tracing::debug!(?config, "loaded configuration");

    let app = App::open(config)?;

    let result = match cli.command {
        Commands::Send { text } => commands::messaging::send(&app, text).await,
        Commands::Photo { path } => commands::attachments::photo(&app, path).await,
        Commands::Capture { from, deny } => commands::attachments::capture(&app, from, deny).await,
        Commands::History { newest_first, json } => {
            commands::messaging::history(&app, newest_first, json).await
        }
        Commands::Watch { count } => commands::messaging::watch(&app, count).await,
        Commands::Profile { action } => match action.unwrap_or(ProfileAction::Show) {
            ProfileAction::Show => commands::profile::show(&app),
            ProfileAction::SetName { name } => commands::profile::set_name(&app, &name),
            ProfileAction::SetImage { path } => commands::profile::set_image(&app, path).await,
            ProfileAction::ClearImage => commands::profile::clear_image(&app),
        },
        Commands::Prune => commands::attachments::prune(&app),
    };

    app.shutdown().await;
    result
}

//! # kallio-store
//!
//! Local storage for the Kallio chat application, backed by SQLite.
//!
//! - [`MessageStore`]: append-only chat log.  Writes go through a single
//!   writer thread; readers hold a [`Subscription`] that receives the full
//!   ordered collection after every append.
//! - [`ProfileStore`]: the user's display name and profile picture, kept in a
//!   key-value preference namespace.
//! - [`AttachmentStore`]: copies picked or captured images into app-owned
//!   files and hands out stable references.
//!
//! There are no global instances.  The application opens each store once
//! and passes the handles to whoever needs them.

pub mod attachments;
pub mod config;
pub mod database;
pub mod message_store;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod preferences;
pub mod profile;

mod error;

pub use attachments::{
    AttachmentKind, AttachmentStore, BytesSource, CaptureSession, CaptureState, FileSource,
    ImageSource, StableImageRef,
};
pub use config::StoreConfig;
pub use database::Database;
pub use error::{ErrorKind, Result, StoreError};
pub use message_store::{Listener, MessageStore, Snapshot, Subscription};
pub use models::*;
pub use profile::ProfileStore;

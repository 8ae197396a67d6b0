//! Command handlers.
//!
//! Each sub-module groups related commands.  Handlers take the opened
//! [`App`](crate::app::App) and print results to stdout; logs go to stderr.

pub mod attachments;
pub mod messaging;
pub mod profile;

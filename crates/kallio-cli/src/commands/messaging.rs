use anyhow::{Context, Result};
use futures::StreamExt;
use kallio_store::{ChatEntry, NewEntry};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::app::App;

/// Append a text message.
///
/// On failure the text is echoed back in the error so nothing the user typed
/// is lost.
pub async fn send(app: &App, text: String) -> Result<()> {
    let entry = app
        .messages
        .append(NewEntry::text(text.clone()))
        .await
        .with_context(|| format!("message not sent, your text was kept: {text:?}"))?;

    info!(id = entry.id, "message sent");
    println!("{}", format_entry(&entry));
    Ok(())
}

pub async fn history(app: &App, newest_first: bool, json: bool) -> Result<()> {
    let snapshot = app.messages.snapshot().await?;
    let view = ordered_view(&snapshot, newest_first);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    if view.is_empty() {
        println!("No messages yet.");
    }
    for entry in view {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

/// A minimal chat session: print every snapshot the store publishes and send
/// each line read from stdin.
///
/// The message store admits one writer per database, so this process is the
/// only one appending while it runs.  Other `kallio` invocations are refused
/// until it exits.
pub async fn watch(app: &App, count: Option<usize>) -> Result<()> {
    watch_with(app, count, BufReader::new(tokio::io::stdin())).await
}

/// Runs until `count` snapshots were printed, the store closes, or Ctrl-C.
/// End of input stops sending but keeps watching.
async fn watch_with<R>(app: &App, count: Option<usize>, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut subscription = app.messages.subscribe().await?;
    let mut lines = input.lines();
    let mut input_open = true;
    let mut seen = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line.context("failed to read input")? {
                    Some(text) => {
                        if let Err(e) = send(app, text).await {
                            eprintln!("{e:#}");
                        }
                    }
                    None => input_open = false,
                }
            }
            next = subscription.next() => {
                let Some(snapshot) = next else { break };
                match snapshot.iter().max_by_key(|e| e.id) {
                    Some(latest) => println!(
                        "-- {} message(s), latest: {}",
                        snapshot.len(),
                        format_entry(latest)
                    ),
                    None => println!("-- no messages yet"),
                }

                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    Ok(())
}

/// The collection in display order.  Newest-first mirrors the reversed list a
/// chat screen shows.
pub fn ordered_view(entries: &[ChatEntry], newest_first: bool) -> Vec<&ChatEntry> {
    if newest_first {
        entries.iter().rev().collect()
    } else {
        entries.iter().collect()
    }
}

pub fn format_entry(entry: &ChatEntry) -> String {
    let when = entry
        .created_at_utc()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.created_at.to_string());

    let mut line = format!("#{} [{when}]", entry.id);
    if !entry.text.is_empty() {
        line.push(' ');
        line.push_str(&entry.text);
    }
    if let Some(path) = &entry.image_path {
        line.push_str(&format!(" (photo: {path})"));
    }
    line
}

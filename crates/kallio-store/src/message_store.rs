//! Append-only chat log with live snapshots.
//!
//! A single writer thread owns the SQLite connection and consumes a bounded
//! request queue, so appends are serialized and emissions follow commit
//! order.  Every successful append pushes the full ordered collection to
//! each live subscriber, one value per append, never coalesced.
//!
//! ```text
//!  MessageStore ──(StoreCommand)──► writer thread ──► SQLite
//!        ▲                              │
//!        └──── oneshot replies ─────────┤
//!  Subscription ◄── Snapshot ───────────┘
//! ```

use std::fs::File;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use fs2::FileExt;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChatEntry, NewEntry};

/// The full ordered collection at one point in time.
pub type Snapshot = Arc<Vec<ChatEntry>>;

// ---------------------------------------------------------------------------
// Requests handled by the writer
// ---------------------------------------------------------------------------

enum StoreCommand {
    Append {
        entry: NewEntry,
        reply: oneshot::Sender<Result<ChatEntry>>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Subscribe {
        tx: mpsc::UnboundedSender<Snapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// MessageStore handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the message log.  All clones talk to the same writer.
#[derive(Clone, Debug)]
pub struct MessageStore {
    cmd_tx: mpsc::Sender<StoreCommand>,
}

impl MessageStore {
    /// Open the configured database and start the writer thread.
    ///
    /// Only one writer may own a database at a time.  While another
    /// `MessageStore` (in this or any other process) holds it, this fails
    /// with [`StoreError::Locked`].  The lock is released once the writer
    /// stops.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let lock = acquire_lock(&config.lock_path())?;
        let db = Database::open(config)?;
        Self::start(db, lock, config.queue_capacity)
    }

    fn start(db: Database, lock: File, queue_capacity: usize) -> Result<Self> {
        let entries = db.list_messages()?;
        info!(entries = entries.len(), "loaded chat history");

        let (cmd_tx, cmd_rx) = mpsc::channel(queue_capacity.max(1));
        let writer = Writer {
            db,
            _lock: lock,
            current: Arc::new(entries),
            subscribers: Vec::new(),
        };

        std::thread::Builder::new()
            .name("kallio-writer".to_string())
            .spawn(move || writer.run(cmd_rx))?;

        Ok(Self { cmd_tx })
    }

    /// Durably append an entry and publish the new collection.
    ///
    /// Returns the stored entry with its assigned `id` and `created_at`.  By
    /// the time this resolves, every live subscriber has the new snapshot
    /// queued.
    pub async fn append(&self, entry: NewEntry) -> Result<ChatEntry> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Append { entry, reply }).await?;
        rx.await.map_err(|_| StoreError::StoreNotInitialized)?
    }

    /// The current ordered collection.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| StoreError::StoreNotInitialized)
    }

    /// Register a live view.  The first value is the collection as of
    /// registration; each later value follows one successful append.
    pub async fn subscribe(&self) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(StoreCommand::Subscribe { tx }).await?;
        Ok(Subscription { rx })
    }

    /// Register a callback observer driven by a background task.
    ///
    /// Must be called from within a tokio runtime.  Delivery stops when the
    /// returned [`Listener`] is dropped or cancelled, or when the store
    /// closes.
    pub async fn subscribe_with<F>(&self, mut on_snapshot: F) -> Result<Listener>
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let mut subscription = self.subscribe().await?;
        let handle = tokio::spawn(async move {
            while let Some(snapshot) = subscription.recv().await {
                on_snapshot(snapshot);
            }
        });
        Ok(Listener { handle })
    }

    /// Stop the writer.  Requests already queued are still served; anything
    /// sent afterwards fails with [`StoreError::StoreNotInitialized`], and all
    /// subscriptions end.
    pub async fn close(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Shutdown { reply }).await?;
        rx.await.map_err(|_| StoreError::StoreNotInitialized)
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    async fn send(&self, cmd: StoreCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| StoreError::StoreNotInitialized)
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Live sequence of snapshots.  Ends (yields `None`) when the store closes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Next snapshot if one is already queued.
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        self.rx.poll_recv(cx)
    }
}

/// Handle to a callback observer registered with
/// [`MessageStore::subscribe_with`].
pub struct Listener {
    handle: JoinHandle<()>,
}

impl Listener {
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Writer thread
// ---------------------------------------------------------------------------

fn acquire_lock(path: &Path) -> Result<File> {
    let lock_file = File::create(path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| StoreError::Locked(path.to_path_buf()))?;
    debug!(path = %path.display(), "writer lock acquired");
    Ok(lock_file)
}

struct Writer {
    db: Database,
    _lock: File,
    current: Snapshot,
    subscribers: Vec<mpsc::UnboundedSender<Snapshot>>,
}

impl Writer {
    fn run(mut self, mut cmd_rx: mpsc::Receiver<StoreCommand>) {
        info!("message writer started");
        let mut shutdown_reply = None;

        while let Some(cmd) = cmd_rx.blocking_recv() {
            match cmd {
                StoreCommand::Append { entry, reply } => {
                    let result = self.append(&entry);
                    let _ = reply.send(result);
                }
                StoreCommand::Snapshot { reply } => {
                    let _ = reply.send(Arc::clone(&self.current));
                }
                StoreCommand::Subscribe { tx } => {
                    if tx.send(Arc::clone(&self.current)).is_ok() {
                        self.subscribers.push(tx);
                        debug!(subscribers = self.subscribers.len(), "subscriber added");
                    }
                }
                StoreCommand::Shutdown { reply } => {
                    // Serve what is already queued, refuse anything new.
                    cmd_rx.close();
                    shutdown_reply = Some(reply);
                }
            }
        }

        self.subscribers.clear();
        // Connection and lock go before `close` resolves, so the caller may
        // reopen straight away.
        drop(self);
        info!("message writer stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn append(&mut self, entry: &NewEntry) -> Result<ChatEntry> {
        let stored = match self.db.insert_message(entry) {
            Ok(stored) => stored,
            Err(e) => {
                if e.is_storage_failure() {
                    error!(error = %e, "failed to persist chat entry");
                } else {
                    debug!(error = %e, "rejected chat entry");
                }
                return Err(e);
            }
        };

        let key = stored.order_key();
        let entries = Arc::make_mut(&mut self.current);
        let at = entries.partition_point(|e| e.order_key() <= key);
        entries.insert(at, stored.clone());

        debug!(id = stored.id, created_at = stored.created_at, "chat entry appended");
        self.publish();
        Ok(stored)
    }

    fn publish(&mut self) {
        let snapshot = &self.current;
        self.subscribers
            .retain(|tx| tx.send(Arc::clone(snapshot)).is_ok());
    }
}

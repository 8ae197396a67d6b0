//! Copying transient image sources into app-owned files.
//!
//! A source handle (picker selection, camera output) may be revoked at any
//! time, so its bytes are copied into the attachments directory under a
//! name unique to the call.  The returned [`StableImageRef`] is what gets
//! stored in chat entries and the profile.
//!
//! Camera capture follows a small state machine, see [`CaptureSession`].

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

const MAX_NAME_ATTEMPTS: u32 = 1_000;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// A transient, possibly revocable handle to image bytes.
pub trait ImageSource: Send + 'static {
    /// Open the source for reading.  Any error means the source is gone.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Short human-readable description used in errors and logs.
    fn describe(&self) -> String;
}

/// An image file picked from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource(pub PathBuf);

impl ImageSource for FileSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.0)?))
    }

    fn describe(&self) -> String {
        self.0.display().to_string()
    }
}

/// Image bytes already held in memory.
#[derive(Debug, Clone)]
pub struct BytesSource(pub Vec<u8>);

impl ImageSource for BytesSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::Cursor::new(self.0.clone())))
    }

    fn describe(&self) -> String {
        format!("{} in-memory bytes", self.0.len())
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// What an attachment is used for; decides the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    MessagePhoto,
    ProfilePicture,
}

impl AttachmentKind {
    pub fn file_prefix(self) -> &'static str {
        match self {
            AttachmentKind::MessagePhoto => "message_photo",
            AttachmentKind::ProfilePicture => "profile_picture",
        }
    }

    fn owns(name: &str) -> bool {
        [AttachmentKind::MessagePhoto, AttachmentKind::ProfilePicture]
            .iter()
            .any(|kind| name.starts_with(kind.file_prefix()) && name.ends_with(".jpg"))
    }
}

/// A completely written, fsynced attachment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableImageRef {
    pub path: PathBuf,
    pub size: u64,
}

impl StableImageRef {
    /// The path in the form stored by the message and profile stores.
    pub fn to_path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

// ---------------------------------------------------------------------------
// AttachmentStore
// ---------------------------------------------------------------------------

/// Owner of the attachments directory.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
}

impl AttachmentStore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::new(config.attachments_dir())
    }

    /// Create the directory if needed.  The stored path is canonical so
    /// references compare reliably.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        let dir = dir.as_ref().canonicalize()?;
        info!(path = %dir.display(), "attachment store initialized");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into a fresh attachment file on the blocking pool.
    pub async fn persist<S: ImageSource>(
        &self,
        source: S,
        kind: AttachmentKind,
    ) -> Result<StableImageRef> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.persist_blocking(&source, kind))
            .await
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    /// Synchronous form of [`persist`](Self::persist).
    ///
    /// A source yielding zero bytes produces a valid zero-byte reference.  If
    /// the copy fails partway the destination file is deleted.
    pub fn persist_blocking(
        &self,
        source: &dyn ImageSource,
        kind: AttachmentKind,
    ) -> Result<StableImageRef> {
        let mut reader = source.open().map_err(|e| {
            StoreError::SourceUnavailable(format!("{}: {e}", source.describe()))
        })?;

        let (path, mut file) = self.reserve_file(kind)?;

        let written = copy_durably(&mut reader, &mut file).and_then(|size| {
            sync_dir(&self.dir)?;
            Ok(size)
        });
        let size = match written {
            Ok(size) => size,
            Err(e) => {
                drop(file);
                discard(&path);
                warn!(source = %source.describe(), error = %e, "attachment copy failed");
                return Err(e.into());
            }
        };

        if size == 0 {
            warn!(path = %path.display(), "persisted empty attachment");
        }
        debug!(path = %path.display(), size, "attachment persisted");

        Ok(StableImageRef { path, size })
    }

    /// Start a camera capture flow writing into this store.
    pub fn begin_capture(&self, kind: AttachmentKind) -> CaptureSession<'_> {
        CaptureSession {
            store: self,
            kind,
            state: CaptureState::Idle,
        }
    }

    /// Delete attachment files not listed in `referenced`.
    ///
    /// Only files named like attachments are considered.  Must not run while
    /// a capture session holds a reserved file.
    pub fn prune_orphans<I, P>(&self, referenced: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let keep: HashSet<PathBuf> = referenced
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                p.canonicalize().unwrap_or_else(|_| p.to_path_buf())
            })
            .collect();

        let mut removed = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !AttachmentKind::owns(name) {
                continue;
            }

            let path = self.dir.join(name);
            if keep.contains(&path) {
                continue;
            }
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "removed orphaned attachment");
            removed.push(path);
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "pruned orphaned attachments");
        }
        Ok(removed)
    }

    /// Create a new, empty file with a name no other call has used.
    fn reserve_file(&self, kind: AttachmentKind) -> Result<(PathBuf, File)> {
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}_{stamp}.jpg", kind.file_prefix())
            } else {
                format!("{}_{stamp}_{attempt}.jpg", kind.file_prefix())
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not find a free attachment file name",
        )))
    }
}

fn copy_durably(reader: &mut dyn Read, file: &mut File) -> io::Result<u64> {
    let size = io::copy(reader, file)?;
    file.flush()?;
    file.sync_all()?;
    Ok(size)
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial attachment");
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Camera capture
// ---------------------------------------------------------------------------

/// States of a camera capture.
///
/// ```text
/// Idle → PermissionRequested ─┬─ granted → PermissionGranted → FileReserved
///                             │      → CaptureInProgress ─┬─ Persisted
///                             │                           └─ Discarded
///                             └─ denied → Idle
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    PermissionRequested,
    PermissionGranted,
    FileReserved(PathBuf),
    CaptureInProgress(PathBuf),
    Persisted(StableImageRef),
    Discarded,
}

/// One camera capture into an [`AttachmentStore`].
///
/// The destination file is created before the camera runs, because the
/// capture needs an existing writable target.  Afterwards a non-empty file
/// is the only success signal; anything else discards the file.  Dropping a
/// session mid-capture also removes the reserved file.
pub struct CaptureSession<'a> {
    store: &'a AttachmentStore,
    kind: AttachmentKind,
    state: CaptureState,
}

impl CaptureSession<'_> {
    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn request_permission(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Idle => {
                self.state = CaptureState::PermissionRequested;
                Ok(())
            }
            _ => Err(self.bad_transition("request permission")),
        }
    }

    /// Record the user's answer.  Returns whether the flow may continue; a
    /// denial sends the session back to `Idle`.
    pub fn permission_result(&mut self, granted: bool) -> Result<bool> {
        if self.state != CaptureState::PermissionRequested {
            return Err(self.bad_transition("record permission"));
        }
        if granted {
            self.state = CaptureState::PermissionGranted;
        } else {
            info!("camera permission denied");
            self.state = CaptureState::Idle;
        }
        Ok(granted)
    }

    /// Create the (empty) destination file the camera will write into.
    pub fn reserve(&mut self) -> Result<PathBuf> {
        if self.state != CaptureState::PermissionGranted {
            return Err(self.bad_transition("reserve a file"));
        }
        let (path, file) = self.store.reserve_file(self.kind)?;
        drop(file);
        debug!(path = %path.display(), "capture target reserved");
        self.state = CaptureState::FileReserved(path.clone());
        Ok(path)
    }

    /// Mark the capture as started and return the target path.
    pub fn start(&mut self) -> Result<PathBuf> {
        match &self.state {
            CaptureState::FileReserved(path) => {
                let path = path.clone();
                self.state = CaptureState::CaptureInProgress(path.clone());
                Ok(path)
            }
            _ => Err(self.bad_transition("start capture")),
        }
    }

    /// Conclude the capture.  `Some` if the target holds a non-empty image,
    /// `None` if it was discarded.
    pub fn finish(&mut self, reported_success: bool) -> Result<Option<StableImageRef>> {
        let path = match &self.state {
            CaptureState::CaptureInProgress(path) => path.clone(),
            _ => return Err(self.bad_transition("finish capture")),
        };

        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if !reported_success || size == 0 {
            discard(&path);
            info!(reported_success, size, "camera capture discarded");
            self.state = CaptureState::Discarded;
            return Ok(None);
        }

        OpenOptions::new().write(true).open(&path)?.sync_all()?;
        sync_dir(self.store.dir())?;

        let image = StableImageRef { path, size };
        info!(path = %image.path.display(), size, "camera capture persisted");
        self.state = CaptureState::Persisted(image.clone());
        Ok(Some(image))
    }

    /// Drive the whole flow.  `ask_permission` stands in for the OS prompt;
    /// `capture` writes into the target and reports success.
    pub fn run<P, C>(&mut self, ask_permission: P, capture: C) -> Result<Option<StableImageRef>>
    where
        P: FnOnce() -> bool,
        C: FnOnce(&Path) -> bool,
    {
        self.request_permission()?;
        if !self.permission_result(ask_permission())? {
            return Ok(None);
        }
        self.reserve()?;
        let target = self.start()?;
        let reported_success = capture(&target);
        self.finish(reported_success)
    }

    fn bad_transition(&self, action: &str) -> StoreError {
        StoreError::InvalidEntry(format!("cannot {action} while capture is {:?}", self.state))
    }
}

impl Drop for CaptureSession<'_> {
    fn drop(&mut self) {
        if let CaptureState::FileReserved(path) | CaptureState::CaptureInProgress(path) =
            &self.state
        {
            debug!(path = %path.display(), "abandoned capture, removing target");
            discard(path);
        }
    }
}

//! Named-pipe channels
//!
//! Thin wrappers over FIFOs: create/open/unlink, plus the shared
//! [`NotificationChannel`] handle the table writes change events into.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{KvsError, Result};
use crate::protocol::{encode_notification, Notification};

// =============================================================================
// FIFO helpers
// =============================================================================

/// Create a FIFO at `path` with mode 0666.
///
/// A stale FIFO left behind by a previous run is replaced.
pub fn create_fifo(path: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(path) {
        use std::os::unix::fs::FileTypeExt;
        if !meta.file_type().is_fifo() {
            return Err(KvsError::Transport(format!(
                "{} exists and is not a FIFO",
                path.display()
            )));
        }
        tracing::debug!("Replacing stale FIFO {}", path.display());
        fs::remove_file(path).map_err(|e| KvsError::from_io(e, "unlinking stale FIFO"))?;
    }

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| KvsError::Transport(format!("{} contains a NUL byte", path.display())))?;

    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) };
    if rc != 0 {
        return Err(KvsError::from_io(
            io::Error::last_os_error(),
            &format!("creating FIFO {}", path.display()),
        ));
    }
    Ok(())
}

/// Remove a FIFO; a missing file is not an error.
pub fn unlink_fifo(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(KvsError::from_io(e, &format!("unlinking {}", path.display()))),
    }
}

/// Open the read end of a FIFO. Blocks until a writer opens it.
pub fn open_read(path: &Path) -> Result<File> {
    open_retrying(path, OpenOptions::new().read(true))
}

/// Open the write end of a FIFO. Blocks until a reader opens it.
pub fn open_write(path: &Path) -> Result<File> {
    open_retrying(path, OpenOptions::new().write(true))
}

fn open_retrying(path: &Path, options: &OpenOptions) -> Result<File> {
    loop {
        match options.open(path) {
            Ok(file) => return Ok(file),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                tracing::trace!("open({}) interrupted, retrying", path.display());
            }
            Err(e) => {
                return Err(KvsError::from_io(e, &format!("opening {}", path.display())))
            }
        }
    }
}

// =============================================================================
// Notification channel
// =============================================================================

/// Shared write handle to one client's notification FIFO.
///
/// Held by the client's session and by every subscriber record the client
/// owns. Frames are written under a mutex so concurrent notifiers (job
/// workers touching different buckets) never interleave a key/value pair.
/// Once closed, every send fails and subscribers holding the handle count
/// as inactive.
pub struct NotificationChannel {
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    closed: AtomicBool,
}

impl NotificationChannel {
    pub fn new(writer: impl Write + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            writer: Mutex::new(Some(Box::new(writer))),
            closed: AtomicBool::new(false),
        })
    }

    /// Write one `(key, value)` notification.
    pub fn send(&self, notification: &Notification) -> Result<()> {
        let bytes = encode_notification(notification)?;

        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| KvsError::Transport("notification channel closed".to_string()))?;

        writer
            .write_all(&bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| KvsError::from_io(e, "writing notification"))
    }

    /// Close the underlying FIFO. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the writer closes the fd; the client's reader sees EOF.
        self.writer.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

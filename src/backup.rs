//! Backup Snapshot Writer
//!
//! A backup is a point-in-time copy of the table, taken under every bucket
//! read lock and then written to disk by a detached thread so job workers
//! and sessions keep mutating the live table while the file is produced.
//!
//! Writes go to a `.tmp` file first and are renamed on completion, so a
//! reader never sees a partial backup. The number of backups being written
//! at once is bounded by a counting semaphore.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::{KvsError, Result};
use crate::jobs::format_entry;
use crate::sync::Semaphore;
use crate::table::{Entry, KvTable};

/// Path of the `seq`-th backup taken by job `job_name`: `{dir}/{job_name}-{seq}.bck`
pub fn backup_path(dir: &Path, job_name: &str, seq: usize) -> PathBuf {
    dir.join(format!("{}-{}.bck", job_name, seq))
}

// =============================================================================
// Snapshot file
// =============================================================================

/// Writes one backup file through a temporary sibling.
///
/// Dropping the writer without calling [`SnapshotWriter::finish`] removes
/// the temporary file.
pub struct SnapshotWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl SnapshotWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let final_path = path.into();
        let tmp_path = final_path.with_extension("bck.tmp");
        let file = File::create(&tmp_path)
            .map_err(|e| KvsError::Backup(format!("creating {}: {}", tmp_path.display(), e)))?;

        Ok(Self {
            final_path,
            tmp_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| KvsError::Backup("snapshot already finished".to_string()))?;
        writer.write_all(format_entry(&entry.key, &entry.value).as_bytes())?;
        Ok(())
    }

    /// Flush, fsync and move the file into place.
    pub fn finish(mut self) -> Result<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| KvsError::Backup("snapshot already finished".to_string()))?;
        let file = writer
            .into_inner()
            .map_err(|e| KvsError::Backup(format!("flushing snapshot: {}", e)))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(())
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Write `entries` to `path` in SHOW format.
pub fn write_snapshot(path: &Path, entries: &[Entry]) -> Result<()> {
    let mut writer = SnapshotWriter::create(path)?;
    for entry in entries {
        writer.write_entry(entry)?;
    }
    writer.finish()
}

// =============================================================================
// Concurrency limit
// =============================================================================

/// Bounds the number of backups in flight and tracks their writer threads.
pub struct BackupLimiter {
    slots: Arc<Semaphore>,
    in_flight: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl BackupLimiter {
    pub fn new(max_backups: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_backups.max(1))),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Start a backup of `table` into `path`.
    ///
    /// Blocks while `max_backups` backups are already being written. Once a
    /// slot is free the snapshot is taken on the calling thread and the
    /// file is written in the background; the slot is released when the
    /// writer thread finishes.
    pub fn start(&self, table: &KvTable, path: PathBuf) -> Result<()> {
        let permit = self.slots.acquire_owned();
        let entries = table.snapshot();

        let handle = thread::Builder::new()
            .name("backup".to_string())
            .spawn(move || {
                let result = write_snapshot(&path, &entries);
                drop(permit);
                match &result {
                    Ok(()) => tracing::info!(
                        path = %path.display(),
                        entries = entries.len(),
                        "Backup written"
                    ),
                    Err(e) => tracing::warn!(path = %path.display(), "Backup failed: {}", e),
                }
                result
            })
            .map_err(|e| KvsError::Backup(format!("spawning writer: {}", e)))?;

        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
        Ok(())
    }

    /// Number of writer threads not yet joined
    pub fn pending(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Join every outstanding backup. Returns the first failure.
    pub fn wait_all(&self) -> Result<()> {
        let handles: Vec<_> = self.in_flight.lock().drain(..).collect();

        let mut first_err = None;
        for handle in handles {
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(KvsError::Backup("writer thread panicked".to_string())));
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

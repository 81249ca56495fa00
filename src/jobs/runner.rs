//! Job Runner
//!
//! `max_threads` workers pull job files from one shared directory cursor
//! and run them to completion. The cursor sits behind a mutex, so every
//! directory entry is handed to exactly one worker.

use std::fs::{self, File, ReadDir};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::{KvsError, Result};

use super::{parse_line, JobCommand, JobState};

/// True for regular files named `*.job`
pub fn is_job_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "job") && path.is_file()
}

/// Runs every job file in the configured directory
pub struct JobRunner {
    engine: Arc<Engine>,
}

impl JobRunner {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Run all job files, blocking until every worker is done.
    ///
    /// Returns the number of job files processed. A failing job is logged
    /// and does not stop the others.
    pub fn run(&self) -> Result<usize> {
        let config = self.engine.config();
        let cursor = Mutex::new(fs::read_dir(&config.jobs_dir).map_err(|e| {
            KvsError::Config(format!("reading {}: {}", config.jobs_dir.display(), e))
        })?);

        let workers = config.max_threads;
        tracing::info!(dir = %config.jobs_dir.display(), workers, "Running jobs");

        crossbeam::thread::scope(|s| -> Result<usize> {
            let handles = (0..workers)
                .map(|n| {
                    let cursor = &cursor;
                    s.builder()
                        .name(format!("job-{}", n))
                        .spawn(move |_| self.worker(cursor))
                        .map_err(KvsError::from)
                })
                .collect::<Result<Vec<_>>>()?;

            let mut processed = 0;
            for handle in handles {
                processed += handle
                    .join()
                    .map_err(|_| KvsError::Transport("job worker panicked".to_string()))?;
            }
            Ok(processed)
        })
        .map_err(|_| KvsError::Transport("job worker panicked".to_string()))?
    }

    fn worker(&self, cursor: &Mutex<ReadDir>) -> usize {
        let mut processed = 0;
        while let Some(path) = next_job(cursor) {
            match self.run_job(&path) {
                Ok(()) => tracing::debug!(job = %path.display(), "Job finished"),
                Err(e) => tracing::warn!(job = %path.display(), "Job failed: {}", e),
            }
            processed += 1;
        }
        processed
    }

    /// Run one job file, writing its results to the sibling `.out` file.
    pub fn run_job(&self, path: &Path) -> Result<()> {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| KvsError::Config(format!("bad job file name {}", path.display())))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut input = BufReader::new(File::open(path)?);
        let mut out = BufWriter::new(File::create(path.with_extension("out"))?);
        let mut state = JobState::new(name, dir);

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let command = decode_line(&buf);
            self.engine.execute(&command, &mut state, &mut out)?;
        }

        out.flush()?;
        Ok(())
    }
}

/// Parse one raw job line. Bytes that are not UTF-8 make the whole line
/// invalid; the job carries on with the next one.
fn decode_line(raw: &[u8]) -> JobCommand {
    match std::str::from_utf8(raw) {
        Ok(line) => parse_line(line),
        Err(_) => JobCommand::Invalid(String::from_utf8_lossy(raw).trim().to_string()),
    }
}

/// Take the next job file from the shared cursor.
fn next_job(cursor: &Mutex<ReadDir>) -> Option<PathBuf> {
    let mut entries = cursor.lock();
    loop {
        match entries.next()? {
            Ok(entry) => {
                let path = entry.path();
                if is_job_file(&path) {
                    return Some(path);
                }
            }
            Err(e) => tracing::warn!("Skipping unreadable directory entry: {}", e),
        }
    }
}

//! Jobs Module
//!
//! Job files are line-oriented command scripts run against the table by a
//! pool of worker threads. Each `X.job` writes its results to `X.out` and
//! its backups to `X-<n>.bck` in the same directory.
//!
//! ## Commands
//! ```text
//! WRITE [(key,value)(key2,value2)]
//! READ [key,key2]
//! DELETE [key,key2]
//! SHOW
//! WAIT <delay_ms>
//! BACKUP
//! HELP
//! ```

mod output;
mod parser;
mod runner;

use std::path::PathBuf;

pub use output::{format_delete, format_entry, format_read, format_show, WAITING};
pub use parser::{parse_command, parse_line};
pub use runner::{is_job_file, JobRunner};

/// Max number of pairs or keys in one WRITE/READ/DELETE
pub const MAX_WRITE_SIZE: usize = 256;

/// Usage text printed by HELP
pub const HELP_TEXT: &str = "Available commands:\n  \
    WRITE [(key,value)(key2,value2),...]\n  \
    READ [key,key2,...]\n  \
    DELETE [key,key2,...]\n  \
    SHOW\n  \
    WAIT <delay_ms>\n  \
    BACKUP\n  \
    HELP\n";

/// One parsed job-file line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCommand {
    Write(Vec<(String, String)>),
    Read(Vec<String>),
    Delete(Vec<String>),
    Show,
    /// Pause the job for the given number of milliseconds
    Wait(u64),
    Backup,
    Help,
    /// Blank line or `#` comment
    Empty,
    /// Unparseable line, kept for logging
    Invalid(String),
}

/// Per-job-file execution state
#[derive(Debug, Clone)]
pub struct JobState {
    /// Job file name without its extension
    pub name: String,
    /// Directory backups are written to
    pub dir: PathBuf,
    /// Backups started so far by this job
    pub backups: usize,
}

impl JobState {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            backups: 0,
        }
    }

    /// Sequence number for the next backup (starting at 1)
    pub fn next_backup(&mut self) -> usize {
        self.backups += 1;
        self.backups
    }
}

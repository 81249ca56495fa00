//! Engine Module
//!
//! The context object every component shares.
//!
//! ## Responsibilities
//! - Own the table, the subscription registry and the backup limiter
//! - Execute job commands against the table
//! - Keep backups within `max_backups`

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::backup::{backup_path, BackupLimiter};
use crate::config::Config;
use crate::error::Result;
use crate::jobs::{format_delete, format_read, format_show, JobCommand, JobState, HELP_TEXT, WAITING};
use crate::subscription::SubscriptionRegistry;
use crate::table::{KvTable, WriteOutcome};

/// The server-side engine
///
/// ## Sharing
///
/// Wrapped in an `Arc` and handed to the job runner and the session server.
/// All table access goes through [`KvTable`]'s bucket locks; the engine
/// itself holds no lock across calls.
pub struct Engine {
    config: Config,
    table: Arc<KvTable>,
    subscriptions: SubscriptionRegistry,
    backups: BackupLimiter,
}

impl Engine {
    /// Validate the config and build an engine over an empty table.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Build an engine without checking the config
    pub fn new(config: Config) -> Self {
        let table = Arc::new(KvTable::new());
        let subscriptions = SubscriptionRegistry::new(Arc::clone(&table));
        let backups = BackupLimiter::new(config.max_backups);

        Self {
            config,
            table,
            subscriptions,
            backups,
        }
    }

    /// Execute one job command, writing any output to `out`.
    ///
    /// Per-key misses are reported in the output, not as errors. Errors are
    /// returned only when `out` cannot be written.
    pub fn execute<W: Write>(
        &self,
        command: &JobCommand,
        state: &mut JobState,
        out: &mut W,
    ) -> Result<()> {
        match command {
            JobCommand::Write(pairs) => {
                for (key, outcome) in self.table.write_many(pairs) {
                    if outcome == WriteOutcome::Rejected {
                        tracing::warn!(job = %state.name, key = %key, "Failed to write pair");
                    }
                }
            }
            JobCommand::Read(keys) => {
                out.write_all(format_read(&self.table.read_many(keys)).as_bytes())?;
            }
            JobCommand::Delete(keys) => {
                if let Some(missing) = format_delete(&self.table.delete_many(keys)) {
                    out.write_all(missing.as_bytes())?;
                }
            }
            JobCommand::Show => {
                out.write_all(format_show(&self.table.snapshot()).as_bytes())?;
            }
            JobCommand::Wait(delay_ms) => {
                if *delay_ms > 0 {
                    out.write_all(WAITING.as_bytes())?;
                    out.flush()?;
                    thread::sleep(Duration::from_millis(*delay_ms));
                }
            }
            JobCommand::Backup => {
                if let Err(e) = self.backup(state) {
                    tracing::warn!(job = %state.name, "Failed to perform backup: {}", e);
                }
            }
            JobCommand::Help => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(HELP_TEXT.as_bytes())?;
                stdout.flush()?;
            }
            JobCommand::Empty => {}
            JobCommand::Invalid(line) => {
                tracing::warn!(job = %state.name, line = %line, "Invalid command. See HELP for usage");
            }
        }
        Ok(())
    }

    /// Start the job's next backup, blocking while `max_backups` are running.
    pub fn backup(&self, state: &mut JobState) -> Result<()> {
        let seq = state.next_backup();
        let path = backup_path(&state.dir, &state.name, seq);
        tracing::debug!(job = %state.name, seq, "Starting backup");
        self.backups.start(&self.table, path)
    }

    /// Join every outstanding backup writer
    pub fn wait_for_backups(&self) -> Result<()> {
        self.backups.wait_all()
    }

    /// Close the engine gracefully
    ///
    /// Waits for in-flight backups so no partial file is left behind.
    pub fn close(&self) -> Result<()> {
        self.wait_for_backups()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn table(&self) -> &Arc<KvTable> {
        &self.table
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn backups(&self) -> &BackupLimiter {
        &self.backups
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

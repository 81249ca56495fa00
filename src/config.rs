//! Configuration for PipeKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvsError, Result};

/// Main configuration for a PipeKV server instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Job Configuration
    // -------------------------------------------------------------------------
    /// Directory scanned for `*.job` files.
    /// Output and backups land next to their job file:
    ///   {jobs_dir}/
    ///     ├── name.job
    ///     ├── name.out          (command output)
    ///     └── name-1.bck        (first backup taken by name.job)
    pub jobs_dir: PathBuf,

    /// Number of job-runner worker threads
    pub max_threads: usize,

    /// Max backups being written at the same time
    pub max_backups: usize,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Path of the registration FIFO clients connect through
    pub register_pipe: PathBuf,

    /// Max concurrent client sessions.
    /// Also the capacity of the dispatch queue.
    pub max_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("./jobs"),
            max_threads: 4,
            max_backups: 2,
            register_pipe: PathBuf::from("/tmp/pipekv_register"),
            max_sessions: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check limits and paths before the server starts anything.
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == 0 {
            return Err(KvsError::Config("max_threads must be at least 1".into()));
        }
        if self.max_backups == 0 {
            return Err(KvsError::Config("max_backups must be at least 1".into()));
        }
        if self.max_sessions == 0 {
            return Err(KvsError::Config("max_sessions must be at least 1".into()));
        }
        if !self.jobs_dir.is_dir() {
            return Err(KvsError::Config(format!(
                "jobs directory {} does not exist",
                self.jobs_dir.display()
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the directory holding job files
    pub fn jobs_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.jobs_dir = path.into();
        self
    }

    /// Set the number of job-runner threads
    pub fn max_threads(mut self, count: usize) -> Self {
        self.config.max_threads = count;
        self
    }

    /// Set the number of concurrent backups
    pub fn max_backups(mut self, count: usize) -> Self {
        self.config.max_backups = count;
        self
    }

    /// Set the registration FIFO path
    pub fn register_pipe(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.register_pipe = path.into();
        self
    }

    /// Set the maximum number of concurrent sessions
    pub fn max_sessions(mut self, count: usize) -> Self {
        self.config.max_sessions = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

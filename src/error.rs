//! Error types for PipeKV
//!
//! Provides a unified error type for all operations.
//!
//! Logical misses (key not found, not subscribed) are NOT errors: they are
//! per-item outcomes carried by the table and registry result types.

use std::io;

use thiserror::Error;

/// Result type alias using KvsError
pub type Result<T> = std::result::Result<T, KvsError>;

/// Unified error type for PipeKV operations
#[derive(Debug, Error)]
pub enum KvsError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A blocking read/write was interrupted by signal delivery.
    #[error("Interrupted while {0}")]
    Interrupted(String),

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Table Errors
    // -------------------------------------------------------------------------
    #[error("Key {0:?} cannot be routed to a bucket")]
    InvalidKey(String),

    // -------------------------------------------------------------------------
    // Job Errors
    // -------------------------------------------------------------------------
    #[error("Invalid command: {0}")]
    Parse(String),

    #[error("Backup failed: {0}")]
    Backup(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvsError {
    /// Classify an I/O error raised while doing `context`.
    ///
    /// `Interrupted` is kept apart from hard failures so callers can retry.
    /// Peer-gone errors stay `Io` so [`KvsError::is_disconnect`] sees them.
    pub fn from_io(err: io::Error, context: &str) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted => KvsError::Interrupted(context.to_string()),
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => KvsError::Io(err),
            _ => KvsError::Transport(format!("{}: {}", context, err)),
        }
    }

    /// True if the failed operation may simply be retried.
    pub fn is_interrupted(&self) -> bool {
        match self {
            KvsError::Interrupted(_) => true,
            KvsError::Io(e) => e.kind() == io::ErrorKind::Interrupted,
            _ => false,
        }
    }

    /// True if the peer went away (EOF, broken pipe, reset).
    pub fn is_disconnect(&self) -> bool {
        match self {
            KvsError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

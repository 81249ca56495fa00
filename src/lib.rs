//! # PipeKV
//!
//! A multi-client, in-memory key-value store served over named pipes:
//! - Per-bucket reader/writer locking with deadlock-free batch operations
//! - Key subscriptions with change notifications pushed to clients
//! - Concurrent job-file execution with point-in-time backups
//! - Bounded hand-off of newly registered clients to a session-worker pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐          ┌─────────────────────────────┐
//! │      Job Runner          │          │   Registration Intake       │
//! │ (max_threads workers,    │          │   (register FIFO)           │
//! │  shared dir cursor)      │          └──────────────┬──────────────┘
//! └────────────┬─────────────┘                         │
//!              │                                       ▼
//!              │                          ┌─────────────────────────┐
//!              │                          │     Dispatch Queue      │
//!              │                          │ (bounded, 2 semaphores) │
//!              │                          └────────────┬────────────┘
//!              │                                       │
//!              │                                       ▼
//!              │                          ┌─────────────────────────┐
//!              │                          │    Session Workers      │
//!              │                          │ (SUB / UNSUB / DISC)    │
//!              │                          └────────────┬────────────┘
//!              ▼                                       ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           KvTable                                │
//! │     36 buckets × RwLock  ──  entries + per-key subscribers       │
//! └──────────────┬──────────────────────────────────┬────────────────┘
//!                │ snapshot                         │ notify
//!                ▼                                  ▼
//!        ┌───────────────┐                 ┌─────────────────┐
//!        │    Backups    │                 │  Notification   │
//!        │ (≤ max_backups│                 │     FIFOs       │
//!        │  in flight)   │                 └─────────────────┘
//!        └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod sync;

pub mod table;
pub mod subscription;
pub mod protocol;
pub mod channel;
pub mod session;
pub mod jobs;
pub mod backup;
pub mod engine;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvsError, Result};
pub use config::Config;
pub use engine::Engine;
pub use table::KvTable;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of PipeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Table Module
//!
//! The shared in-memory key-value table.
//!
//! ## Responsibilities
//! - Route keys to buckets by their first character
//! - One reader/writer lock per bucket
//! - Deadlock-free multi-key batches (sorted keys, ascending bucket locks)
//! - Notify subscribers on write/delete under the same bucket lock
//! - Linearizable full-table snapshots for SHOW and BACKUP
//!
//! ## Lock Discipline
//! Every path that holds more than one bucket lock acquires them in
//! ascending bucket index order, each at most once. The snapshot takes all
//! of them (read mode) in that same order. The client index mutex may be
//! taken while bucket locks are held, but is never held while acquiring one.

mod bucket;
mod kv_table;

pub use bucket::{Bucket, Entry};
pub use kv_table::KvTable;

/// Number of buckets: one per lowercase letter plus one per digit
pub const TABLE_SIZE: usize = 36;

/// Route a key to its bucket.
///
/// `a..=z` (case-insensitive) map to 0..26, `0..=9` to 26..36. Any other
/// first character, or an empty key, is not routable.
pub fn bucket_index(key: &str) -> Option<usize> {
    let first = key.bytes().next()?.to_ascii_lowercase();
    match first {
        b'a'..=b'z' => Some((first - b'a') as usize),
        b'0'..=b'9' => Some(26 + (first - b'0') as usize),
        _ => None,
    }
}

/// Outcome of writing one pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    /// Key could not be routed; nothing was written
    Rejected,
}

/// Outcome of deleting one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Missing,
}

//! Bucketed key-value table with per-bucket RwLocks.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::subscription::ClientIndex;

use super::{bucket_index, Bucket, DeleteOutcome, Entry, WriteOutcome, TABLE_SIZE};

/// The shared key-value table
///
/// ## Concurrency Model: Per-Bucket Readers/Writer
///
/// - **Writes/deletes/subscription changes**: write lock on each touched
///   bucket, acquired once per batch in ascending bucket order
/// - **Reads**: read lock on each touched bucket, same ordering
/// - **Snapshot**: read lock on every bucket, index order
///
/// Operations on disjoint buckets never contend. Batches sort their keys
/// first, so overlapping batches issued from different threads always
/// request locks in the same global order and cannot deadlock.
pub struct KvTable {
    buckets: Vec<RwLock<Bucket>>,

    /// Reverse index of subscriptions, per client
    clients: ClientIndex,
}

type WriteGuards<'a> = BTreeMap<usize, RwLockWriteGuard<'a, Bucket>>;
type ReadGuards<'a> = BTreeMap<usize, RwLockReadGuard<'a, Bucket>>;

impl KvTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            buckets: (0..TABLE_SIZE).map(|_| RwLock::new(Bucket::default())).collect(),
            clients: ClientIndex::new(),
        }
    }

    // =========================================================================
    // Lock helpers
    // =========================================================================

    fn touched_buckets<'k>(keys: impl IntoIterator<Item = &'k str>) -> BTreeSet<usize> {
        keys.into_iter().filter_map(bucket_index).collect()
    }

    /// Write-lock the given buckets in ascending index order.
    pub(crate) fn lock_write(&self, indices: &BTreeSet<usize>) -> WriteGuards<'_> {
        indices.iter().map(|&i| (i, self.buckets[i].write())).collect()
    }

    /// Read-lock the given buckets in ascending index order.
    fn lock_read(&self, indices: &BTreeSet<usize>) -> ReadGuards<'_> {
        indices.iter().map(|&i| (i, self.buckets[i].read())).collect()
    }

    pub(crate) fn bucket(&self, index: usize) -> &RwLock<Bucket> {
        &self.buckets[index]
    }

    pub(crate) fn clients(&self) -> &ClientIndex {
        &self.clients
    }

    // =========================================================================
    // Batch operations
    // =========================================================================

    /// Write a batch of pairs.
    ///
    /// Pairs are applied in key order; duplicate keys keep their batch order
    /// so the last occurrence wins. Outcomes are returned in that same order.
    pub fn write_many(&self, pairs: &[(String, String)]) -> Vec<(String, WriteOutcome)> {
        let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let indices = Self::touched_buckets(sorted.iter().map(|(k, _)| k.as_str()));
        let mut guards = self.lock_write(&indices);

        sorted
            .into_iter()
            .map(|(key, value)| {
                let outcome = match bucket_index(key).and_then(|i| guards.get_mut(&i)) {
                    Some(bucket) => bucket.put(key, value),
                    None => {
                        tracing::debug!(key = %key, "Rejecting write of unroutable key");
                        WriteOutcome::Rejected
                    }
                };
                (key.clone(), outcome)
            })
            .collect()
    }

    /// Read a batch of keys, returning `(key, value)` in sorted key order.
    pub fn read_many(&self, keys: &[String]) -> Vec<(String, Option<String>)> {
        let mut sorted: Vec<&String> = keys.iter().collect();
        sorted.sort();

        let indices = Self::touched_buckets(sorted.iter().map(|k| k.as_str()));
        let guards = self.lock_read(&indices);

        sorted
            .into_iter()
            .map(|key| {
                let value = bucket_index(key)
                    .and_then(|i| guards.get(&i))
                    .and_then(|bucket| bucket.get(key))
                    .map(str::to_string);
                (key.clone(), value)
            })
            .collect()
    }

    /// Delete a batch of keys, returning per-key outcomes in sorted order.
    pub fn delete_many(&self, keys: &[String]) -> Vec<(String, DeleteOutcome)> {
        let mut sorted: Vec<&String> = keys.iter().collect();
        sorted.sort();

        let indices = Self::touched_buckets(sorted.iter().map(|k| k.as_str()));
        let mut guards = self.lock_write(&indices);

        sorted
            .into_iter()
            .map(|key| {
                let outcome = match bucket_index(key).and_then(|i| guards.get_mut(&i)) {
                    Some(bucket) => bucket.remove(key, &self.clients),
                    None => DeleteOutcome::Missing,
                };
                (key.clone(), outcome)
            })
            .collect()
    }

    // =========================================================================
    // Single-key operations
    // =========================================================================

    pub fn write(&self, key: &str, value: &str) -> WriteOutcome {
        let Some(index) = bucket_index(key) else {
            return WriteOutcome::Rejected;
        };
        self.buckets[index].write().put(key, value)
    }

    pub fn read(&self, key: &str) -> Option<String> {
        let index = bucket_index(key)?;
        self.buckets[index].read().get(key).map(str::to_string)
    }

    pub fn delete(&self, key: &str) -> DeleteOutcome {
        let Some(index) = bucket_index(key) else {
            return DeleteOutcome::Missing;
        };
        self.buckets[index].write().remove(key, &self.clients)
    }

    pub fn contains(&self, key: &str) -> bool {
        bucket_index(key).is_some_and(|i| self.buckets[i].read().contains(key))
    }

    // =========================================================================
    // Whole-table operations
    // =========================================================================

    /// Copy out every entry: bucket order, then insertion order.
    ///
    /// All bucket read locks are held together while copying, so the result
    /// is a state the table was in at one instant.
    pub fn snapshot(&self) -> Vec<Entry> {
        let guards: Vec<_> = self.buckets.iter().map(|b| b.read()).collect();
        guards
            .iter()
            .flat_map(|bucket| bucket.entries().iter().cloned())
            .collect()
    }

    /// Number of entries (takes every bucket lock)
    pub fn len(&self) -> usize {
        let guards: Vec<_> = self.buckets.iter().map(|b| b.read()).collect();
        guards.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Client ids subscribed to `key`, in subscription order
    pub fn subscribers_of(&self, key: &str) -> Vec<String> {
        let Some(index) = bucket_index(key) else {
            return Vec::new();
        };
        self.buckets[index]
            .read()
            .subscribers(key)
            .map(|list| list.client_ids().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl Default for KvTable {
    fn default() -> Self {
        Self::new()
    }
}

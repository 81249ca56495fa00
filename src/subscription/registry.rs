//! Subscription Registry
//!
//! Subscribe/unsubscribe/remove-all over the table's buckets.

use std::sync::Arc;

use crate::channel::NotificationChannel;
use crate::error::{KvsError, Result};
use crate::table::{bucket_index, KvTable};

use super::{SubscribeOutcome, Subscriber, UnsubscribeOutcome};

/// Manages client subscriptions on a shared [`KvTable`].
///
/// Subscriber lists live inside the table buckets; this type keeps them and
/// the table's per-client index consistent. Cloning is cheap.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    table: Arc<KvTable>,
}

impl SubscriptionRegistry {
    pub fn new(table: Arc<KvTable>) -> Self {
        Self { table }
    }

    /// Subscribe `client_id` to `key`.
    ///
    /// The key does not need to exist; a subscription to an absent key is
    /// registered and reported as [`SubscribeOutcome::KeyNotFound`].
    pub fn subscribe(
        &self,
        key: &str,
        client_id: &str,
        channel: &Arc<NotificationChannel>,
    ) -> Result<SubscribeOutcome> {
        let index = bucket_index(key).ok_or_else(|| KvsError::InvalidKey(key.to_string()))?;

        let mut bucket = self.table.bucket(index).write();
        let exists = bucket.contains(key);
        let added = bucket
            .subscribers_mut(key)
            .add(Subscriber::new(client_id, Arc::clone(channel)));
        self.table.clients().insert(client_id, key);

        let outcome = match (exists, added) {
            (false, _) => SubscribeOutcome::KeyNotFound,
            (true, true) => SubscribeOutcome::Subscribed,
            (true, false) => SubscribeOutcome::AlreadySubscribed,
        };
        tracing::debug!(client = %client_id, key = %key, ?outcome, "Subscribe");
        Ok(outcome)
    }

    /// Remove `client_id`'s subscription to `key`.
    pub fn unsubscribe(&self, key: &str, client_id: &str) -> UnsubscribeOutcome {
        let Some(index) = bucket_index(key) else {
            return UnsubscribeOutcome::NotSubscribed;
        };

        let mut bucket = self.table.bucket(index).write();
        if bucket.unsubscribe(key, client_id) {
            self.table.clients().remove(client_id, key);
            tracing::debug!(client = %client_id, key = %key, "Unsubscribed");
            UnsubscribeOutcome::Removed
        } else {
            UnsubscribeOutcome::NotSubscribed
        }
    }

    /// Drop every subscription of `client_id`. Returns how many were removed.
    ///
    /// Called once, from the client's own session on disconnect. The
    /// client's key list is detached first, then all affected buckets are
    /// write-locked together in ascending order and the records unlinked. A
    /// notification racing with this either completes before the bucket
    /// lock is taken or finds the record already gone.
    pub fn remove_all(&self, client_id: &str) -> usize {
        let keys = self.table.clients().take(client_id);
        if keys.is_empty() {
            return 0;
        }

        let indices = keys.iter().filter_map(|k| bucket_index(k)).collect();
        let mut guards = self.table.lock_write(&indices);

        let removed = keys
            .iter()
            .filter(|key| {
                bucket_index(key)
                    .and_then(|i| guards.get_mut(&i))
                    .is_some_and(|bucket| bucket.unsubscribe(key, client_id))
            })
            .count();

        tracing::debug!(client = %client_id, removed, "Removed all subscriptions");
        removed
    }

    /// Keys `client_id` is subscribed to, sorted
    pub fn keys_of(&self, client_id: &str) -> Vec<String> {
        self.table.clients().keys_of(client_id)
    }

    pub fn is_subscribed(&self, client_id: &str, key: &str) -> bool {
        self.table.clients().contains(client_id, key)
    }

    pub fn table(&self) -> &Arc<KvTable> {
        &self.table
    }
}

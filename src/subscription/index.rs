//! Per-client subscribed-key index

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;

/// Maps client id → keys that client is subscribed to.
///
/// Lock order: a bucket lock may be held while taking this mutex; this
/// mutex is never held while acquiring a bucket lock.
#[derive(Debug, Default)]
pub struct ClientIndex {
    clients: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl ClientIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client_id: &str, key: &str) {
        self.clients
            .lock()
            .entry(client_id.to_string())
            .or_default()
            .insert(key.to_string());
    }

    pub fn remove(&self, client_id: &str, key: &str) -> bool {
        let mut clients = self.clients.lock();
        let Some(keys) = clients.get_mut(client_id) else {
            return false;
        };
        let removed = keys.remove(key);
        if keys.is_empty() {
            clients.remove(client_id);
        }
        removed
    }

    /// Detach and return every key of `client_id`, in sorted order.
    pub fn take(&self, client_id: &str) -> Vec<String> {
        self.clients
            .lock()
            .remove(client_id)
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default()
    }

    /// Keys `client_id` is subscribed to, in sorted order.
    pub fn keys_of(&self, client_id: &str) -> Vec<String> {
        self.clients
            .lock()
            .get(client_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, client_id: &str, key: &str) -> bool {
        self.clients
            .lock()
            .get(client_id)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Number of clients holding at least one subscription
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

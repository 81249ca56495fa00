//! A single table bucket

use std::collections::HashMap;

use crate::protocol::Notification;
use crate::subscription::{ClientIndex, SubscriberList};

use super::{DeleteOutcome, WriteOutcome};

/// A key-value pair owned by its bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

/// One table partition.
///
/// Entries are kept in insertion order. Subscriber lists are keyed by key
/// name and live independently of entries, so a client can subscribe to a
/// key that has not been written yet.
#[derive(Debug, Default)]
pub struct Bucket {
    entries: Vec<Entry>,
    subscribers: HashMap<String, SubscriberList>,
}

impl Bucket {
    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Insert or replace a value, then notify the key's subscribers.
    pub fn put(&mut self, key: &str, value: &str) -> WriteOutcome {
        let outcome = match self.position(key) {
            Some(pos) => {
                self.entries[pos].value = value.to_string();
                WriteOutcome::Updated
            }
            None => {
                self.entries.push(Entry {
                    key: key.to_string(),
                    value: value.to_string(),
                });
                WriteOutcome::Inserted
            }
        };

        if let Some(subscribers) = self.subscribers.get(key) {
            subscribers.notify(&Notification::update(key, value));
        }
        outcome
    }

    /// Remove a key.
    ///
    /// Active subscribers get a `DELETED` notification, then every
    /// subscriber record of the key is unlinked here and in `clients`.
    pub fn remove(&mut self, key: &str, clients: &ClientIndex) -> DeleteOutcome {
        let Some(pos) = self.position(key) else {
            return DeleteOutcome::Missing;
        };
        self.entries.remove(pos);

        if let Some(mut subscribers) = self.subscribers.remove(key) {
            subscribers.notify(&Notification::deleted(key));
            for client_id in subscribers.drain_client_ids() {
                clients.remove(&client_id, key);
            }
        }
        DeleteOutcome::Deleted
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subscribers(&self, key: &str) -> Option<&SubscriberList> {
        self.subscribers.get(key)
    }

    pub(crate) fn subscribers_mut(&mut self, key: &str) -> &mut SubscriberList {
        self.subscribers.entry(key.to_string()).or_default()
    }

    /// Unlink `client_id` from `key`'s list, dropping the list once empty.
    pub(crate) fn unsubscribe(&mut self, key: &str, client_id: &str) -> bool {
        let Some(list) = self.subscribers.get_mut(key) else {
            return false;
        };
        let removed = list.remove(client_id);
        if list.is_empty() {
            self.subscribers.remove(key);
        }
        removed
    }
}

//! Subscriber records and per-key subscriber lists

use std::sync::Arc;

use crate::channel::NotificationChannel;
use crate::protocol::Notification;

/// One client's standing subscription to one key
#[derive(Debug, Clone)]
pub struct Subscriber {
    client_id: String,
    channel: Arc<NotificationChannel>,
}

impl Subscriber {
    pub fn new(client_id: impl Into<String>, channel: Arc<NotificationChannel>) -> Self {
        Self {
            client_id: client_id.into(),
            channel,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// A subscriber goes inactive once its client's channel is closed.
    pub fn is_active(&self) -> bool {
        !self.channel.is_closed()
    }
}

/// Subscribers of a single key, in subscription order
#[derive(Debug, Default)]
pub struct SubscriberList {
    subscribers: Vec<Subscriber>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.subscribers.iter().any(|s| s.client_id == client_id)
    }

    /// Add a subscriber. Returns false if the client was already present,
    /// in which case its channel handle is replaced.
    pub fn add(&mut self, subscriber: Subscriber) -> bool {
        match self
            .subscribers
            .iter_mut()
            .find(|s| s.client_id == subscriber.client_id)
        {
            Some(existing) => {
                existing.channel = subscriber.channel;
                false
            }
            None => {
                self.subscribers.push(subscriber);
                true
            }
        }
    }

    /// Unlink a client's subscriber record. Returns true if it was present.
    pub fn remove(&mut self, client_id: &str) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.client_id != client_id);
        self.subscribers.len() != before
    }

    /// Send `notification` to every active subscriber in list order.
    ///
    /// A failed write is logged and skipped; it never aborts the caller's
    /// table operation. Returns the number of successful deliveries.
    pub fn notify(&self, notification: &Notification) -> usize {
        let mut delivered = 0;
        for subscriber in self.subscribers.iter().filter(|s| s.is_active()) {
            match subscriber.channel.send(notification) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    client = %subscriber.client_id,
                    key = %notification.key,
                    "Failed to deliver notification: {}",
                    e
                ),
            }
        }
        delivered
    }

    /// Remove every subscriber, returning their client ids.
    pub fn drain_client_ids(&mut self) -> Vec<String> {
        self.subscribers.drain(..).map(|s| s.client_id).collect()
    }

    pub fn client_ids(&self) -> impl Iterator<Item = &str> {
        self.subscribers.iter().map(|s| s.client_id.as_str())
    }
}

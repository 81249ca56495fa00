//! Subscription Module
//!
//! Key subscriptions and change notifications.
//!
//! ## Responsibilities
//! - Per-key subscriber lists (stored inside the key's table bucket, so a
//!   write and its notifications happen under one bucket lock)
//! - Per-client subscribed-key index, kept in sync with the per-key lists
//! - Bulk removal of a client's subscriptions on disconnect
//!
//! ## Invariant
//! A subscriber record for `(client, key)` exists in the key's bucket iff
//! the client's entry in the [`ClientIndex`] contains `key`.
//!
//! Unsubscribe, delete and disconnect all hard-unlink subscriber records;
//! nothing is left behind in a deactivated state.

mod subscriber;
mod index;
mod registry;

pub use subscriber::{Subscriber, SubscriberList};
pub use index::ClientIndex;
pub use registry::SubscriptionRegistry;

use crate::protocol::ResultCode;

/// Outcome of a subscribe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Key exists; client was not subscribed before
    Subscribed,

    /// Key exists; client already held a subscription (channel refreshed)
    AlreadySubscribed,

    /// Key does not exist yet; the subscription is registered anyway and
    /// fires when the key is first written
    KeyNotFound,
}

impl SubscribeOutcome {
    pub fn result_code(self) -> ResultCode {
        match self {
            SubscribeOutcome::Subscribed | SubscribeOutcome::AlreadySubscribed => ResultCode::Ok,
            SubscribeOutcome::KeyNotFound => ResultCode::Failed,
        }
    }
}

/// Outcome of an unsubscribe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Removed,
    NotSubscribed,
}

impl UnsubscribeOutcome {
    pub fn result_code(self) -> ResultCode {
        match self {
            UnsubscribeOutcome::Removed => ResultCode::Ok,
            UnsubscribeOutcome::NotSubscribed => ResultCode::Failed,
        }
    }
}

//! Client records and the Client Registry

use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::channel::NotificationChannel;

/// Lifecycle of a client session, terminal at `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Registration handshake done, waiting in the dispatch queue
    Registered,
    /// A session worker is serving the client
    Active,
    /// Subscriptions and channels are being torn down
    Disconnecting,
    Closed,
}

/// A connected client
#[derive(Debug)]
pub struct Client {
    id: String,
    notification: Arc<NotificationChannel>,
    state: Mutex<ClientState>,
}

impl Client {
    pub fn new(id: impl Into<String>, notification: Arc<NotificationChannel>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            notification,
            state: Mutex::new(ClientState::Registered),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn notification_channel(&self) -> &Arc<NotificationChannel> {
        &self.notification
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        *self.state.lock() = state;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state(), ClientState::Registered | ClientState::Active)
    }
}

/// A registered client plus the request/response ends its session owns.
///
/// This is what travels through the dispatch queue. Only the session worker
/// that pops it may read requests or write responses for the client.
pub struct Session {
    pub client: Arc<Client>,
    pub request: Box<dyn Read + Send>,
    pub response: Box<dyn Write + Send>,
}

impl Session {
    pub fn new(
        client: Arc<Client>,
        request: impl Read + Send + 'static,
        response: impl Write + Send + 'static,
    ) -> Self {
        Self {
            client,
            request: Box::new(request),
            response: Box::new(response),
        }
    }
}

/// Registry of connected clients, looked up by id.
///
/// Inserted into by the intake thread, removed from by a disconnecting
/// session. Insert and removal are single updates under the write lock, so
/// concurrent scans never observe a half-removed client.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<Vec<Arc<Client>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Returns false if the id is already taken.
    pub fn insert(&self, client: Arc<Client>) -> bool {
        let mut clients = self.clients.write();
        if clients.iter().any(|c| c.id == client.id) {
            return false;
        }
        clients.push(client);
        true
    }

    /// Remove a client by id, returning the removed record.
    pub fn remove(&self, id: &str) -> Option<Arc<Client>> {
        let mut clients = self.clients.write();
        let pos = clients.iter().position(|c| c.id == id)?;
        Some(clients.remove(pos))
    }

    /// Remove this exact client record. A different client holding the same
    /// id is left alone.
    pub fn detach(&self, client: &Arc<Client>) -> bool {
        let mut clients = self.clients.write();
        match clients.iter().position(|c| Arc::ptr_eq(c, client)) {
            Some(pos) => {
                clients.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, id: &str) -> Option<Arc<Client>> {
        self.clients.read().iter().find(|c| c.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.read().iter().any(|c| c.id == id)
    }

    /// Ids of every registered client, in registration order
    pub fn ids(&self) -> Vec<String> {
        self.clients.read().iter().map(|c| c.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

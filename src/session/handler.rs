//! Session Handler
//!
//! Serves one client session until it disconnects.

use std::sync::Arc;

use crate::error::{KvsError, Result};
use crate::protocol::{read_request, write_response, OpCode, Request, Response, ResultCode};
use crate::subscription::SubscriptionRegistry;

use super::{Client, ClientRegistry, ClientState, Session};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent DISCONNECT
    Disconnected,
    /// Client closed its request FIFO without saying goodbye
    Hangup,
}

/// Dispatches a session's requests against the subscription registry.
///
/// Cheap to clone; one is shared by every session worker.
#[derive(Clone)]
pub struct SessionHandler {
    subscriptions: SubscriptionRegistry,
    clients: Arc<ClientRegistry>,
}

impl SessionHandler {
    pub fn new(subscriptions: SubscriptionRegistry, clients: Arc<ClientRegistry>) -> Self {
        Self {
            subscriptions,
            clients,
        }
    }

    /// Handle the session (blocking until it ends).
    ///
    /// Reads op-coded requests in a loop and answers each on the response
    /// FIFO. Whatever way the loop ends, the client's subscriptions are
    /// removed, its channels closed and its record dropped from the
    /// registry before returning. A transport or protocol failure ends only
    /// this session and is returned to the caller for logging.
    pub fn handle(&self, mut session: Session) -> Result<SessionEnd> {
        let id = session.client.id().to_string();
        session.client.set_state(ClientState::Active);
        tracing::debug!(client = %id, "Session started");

        let result = self.serve(&mut session);
        self.teardown(session);

        match &result {
            Ok(end) => tracing::debug!(client = %id, ?end, "Session ended"),
            Err(e) => tracing::warn!(client = %id, "Session dropped: {}", e),
        }
        result
    }

    fn serve(&self, session: &mut Session) -> Result<SessionEnd> {
        let id = session.client.id().to_string();

        loop {
            let request = match read_request(&mut session.request) {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(SessionEnd::Hangup),
                Err(e) if e.is_interrupted() => continue,
                Err(e) if e.is_disconnect() => {
                    tracing::debug!(client = %id, "Request channel closed mid-frame: {}", e);
                    return Ok(SessionEnd::Hangup);
                }
                Err(e) => return Err(e),
            };

            tracing::trace!(client = %id, ?request, "Received request");

            let response = match request {
                Request::Connect => {
                    tracing::warn!(client = %id, "Ignoring CONNECT on an open session");
                    continue;
                }
                Request::Disconnect => {
                    // The id must be free again before the client sees the ack.
                    self.release(&session.client);
                    self.send_response(session, Response::ok(OpCode::Disconnect))?;
                    return Ok(SessionEnd::Disconnected);
                }
                Request::Subscribe { key } => {
                    let channel = session.client.notification_channel();
                    match self.subscriptions.subscribe(&key, &id, channel) {
                        Ok(outcome) => Response::new(OpCode::Subscribe, outcome.result_code()),
                        Err(KvsError::InvalidKey(key)) => {
                            tracing::debug!(client = %id, key = %key, "Subscribe to unroutable key");
                            Response::new(OpCode::Subscribe, ResultCode::Failed)
                        }
                        Err(e) => return Err(e),
                    }
                }
                Request::Unsubscribe { key } => {
                    let outcome = self.subscriptions.unsubscribe(&key, &id);
                    Response::new(OpCode::Unsubscribe, outcome.result_code())
                }
            };

            self.send_response(session, response)?;
        }
    }

    /// Send a response to the client
    fn send_response(&self, session: &mut Session, response: Response) -> Result<()> {
        write_response(&mut session.response, &response)
    }

    /// Drop the client's subscriptions, close its notification channel and
    /// free its id. Only the session's own worker calls this; a second call
    /// is a no-op, so it never touches a newer client that reused the id.
    fn release(&self, client: &Arc<Client>) {
        if client.state() == ClientState::Closed {
            return;
        }

        client.set_state(ClientState::Disconnecting);
        self.subscriptions.remove_all(client.id());
        client.notification_channel().close();
        self.clients.detach(client);
        client.set_state(ClientState::Closed);
    }

    fn teardown(&self, session: Session) {
        let Session {
            client,
            request,
            response,
        } = session;

        self.release(&client);
        drop(request);
        drop(response);
    }
}

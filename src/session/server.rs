//! Registration Intake
//!
//! Listens on the registration FIFO, admits clients into the registry and
//! hands their sessions to the session-worker pool via the dispatch queue.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::channel::{self, NotificationChannel};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{KvsError, Result};
use crate::protocol::{
    read_registration, write_response, OpCode, Registration, Response, REGISTRATION_FRAME_SIZE,
};

use super::{Client, ClientRegistry, DispatchQueue, Session, SessionHandler};

/// Session server: one intake thread plus `max_sessions` session workers
pub struct Server {
    config: Config,
    handler: SessionHandler,
    clients: Arc<ClientRegistry>,
    queue: Arc<DispatchQueue<Session>>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Create a new server over the engine's table
    pub fn new(config: Config, engine: Arc<Engine>) -> Self {
        let clients = Arc::new(ClientRegistry::new());
        let handler = SessionHandler::new(engine.subscriptions().clone(), Arc::clone(&clients));
        let queue = Arc::new(DispatchQueue::new(config.max_sessions));

        Self {
            config,
            handler,
            clients,
            queue,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn queue(&self) -> &Arc<DispatchQueue<Session>> {
        &self.queue
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the registration FIFO and start the intake thread and the
    /// session workers.
    pub fn start(self: &Arc<Self>) -> Result<ServerHandle> {
        let register_pipe = self.config.register_pipe.clone();
        channel::create_fifo(&register_pipe)?;

        // Opening read+write never blocks and keeps the FIFO from reporting
        // EOF whenever the last registering client closes its end.
        let listener = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&register_pipe)
            .map_err(|e| KvsError::from_io(e, "opening registration FIFO"))?;

        let workers = self.spawn_session_workers()?;

        let server = Arc::clone(self);
        let intake = thread::Builder::new()
            .name("intake".to_string())
            .spawn(move || server.serve_registrations(listener))?;

        tracing::info!(
            pipe = %register_pipe.display(),
            sessions = self.config.max_sessions,
            "Accepting client registrations"
        );

        Ok(ServerHandle {
            server: Arc::clone(self),
            intake,
            workers,
        })
    }

    /// Spawn the session-worker pool. Workers exit once the queue is
    /// closed and drained.
    pub fn spawn_session_workers(&self) -> Result<Vec<JoinHandle<()>>> {
        (0..self.config.max_sessions)
            .map(|n| {
                let queue = Arc::clone(&self.queue);
                let handler = self.handler.clone();
                thread::Builder::new()
                    .name(format!("session-{}", n))
                    .spawn(move || {
                        while let Some(session) = queue.pop() {
                            // Errors are logged by the handler; the worker moves on.
                            let _ = handler.handle(session);
                        }
                    })
                    .map_err(KvsError::from)
            })
            .collect()
    }

    /// Intake loop: read registration frames until shutdown or EOF.
    pub fn serve_registrations<R: Read>(&self, mut reader: R) -> Result<()> {
        loop {
            let registration = match read_registration(&mut reader) {
                Ok(Some(registration)) => registration,
                Ok(None) => {
                    tracing::debug!("Registration channel closed");
                    return Ok(());
                }
                Err(_) if self.shutdown.load(Ordering::Acquire) => return Ok(()),
                Err(e) if e.is_interrupted() => continue,
                Err(KvsError::Protocol(msg)) => {
                    tracing::warn!("Discarding malformed registration: {}", msg);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Failed to read from registration FIFO: {}", e);
                    return Err(e);
                }
            };

            if self.shutdown.load(Ordering::Acquire) {
                return Ok(());
            }

            if let Err(e) = self.register(&registration) {
                tracing::warn!(client = %registration.client_id, "Registration failed: {}", e);
            }
        }
    }

    /// Open a registering client's FIFOs and admit it.
    ///
    /// Open order (request, response, notification) matches the client's,
    /// so the blocking FIFO opens pair up.
    pub fn register(&self, registration: &Registration) -> Result<()> {
        let request = channel::open_read(&registration.request_path)?;
        let response = channel::open_write(&registration.response_path)?;
        let notification = channel::open_write(&registration.notification_path)?;

        self.admit(
            &registration.client_id,
            request,
            response,
            NotificationChannel::new(notification),
        )
        .map(|_| ())
    }

    /// Admit a client whose channels are already open.
    ///
    /// Answers the CONNECT on the response channel, registers the client
    /// and queues its session (blocking while the queue is full). Returns
    /// false if the id was already taken; that client is refused and its
    /// channels dropped.
    pub fn admit(
        &self,
        client_id: &str,
        request: impl Read + Send + 'static,
        mut response: impl Write + Send + 'static,
        notification: Arc<NotificationChannel>,
    ) -> Result<bool> {
        let client = Client::new(client_id, Arc::clone(&notification));

        if !self.clients.insert(Arc::clone(&client)) {
            tracing::warn!(client = %client_id, "Client id already connected, refusing");
            write_response(&mut response, &Response::failed(OpCode::Connect))?;
            notification.close();
            return Ok(false);
        }

        if let Err(e) = write_response(&mut response, &Response::ok(OpCode::Connect)) {
            self.clients.detach(&client);
            notification.close();
            return Err(e);
        }

        let session = Session::new(Arc::clone(&client), request, response);
        if self.queue.push(session).is_err() {
            tracing::warn!(client = %client_id, "Dispatch queue closed, dropping client");
            self.clients.detach(&client);
            notification.close();
            return Ok(false);
        }

        tracing::info!(client = %client_id, "Client registered");
        Ok(true)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// Running server: intake thread plus worker pool
pub struct ServerHandle {
    server: Arc<Server>,
    intake: JoinHandle<Result<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Stop accepting registrations.
    ///
    /// Closes the dispatch queue, wakes the intake thread and unlinks the
    /// registration FIFO. Sessions already queued or being served run until
    /// their clients disconnect; use [`ServerHandle::wait`] to wait for them.
    pub fn shutdown(self) -> Result<Vec<JoinHandle<()>>> {
        let register_pipe: PathBuf = self.server.config.register_pipe.clone();
        self.server.shutdown();

        // Frees an intake thread stuck pushing into a full queue.
        self.server.queue.close();

        // Wake a blocked intake read with an empty frame.
        let mut waker: File = channel::open_write(&register_pipe)?;
        waker.write_all(&[0u8; REGISTRATION_FRAME_SIZE])?;
        drop(waker);

        let intake_result = self
            .intake
            .join()
            .map_err(|_| KvsError::Transport("intake thread panicked".to_string()))?;

        channel::unlink_fifo(&register_pipe)?;
        tracing::info!("Registration intake stopped");

        intake_result.map(|_| self.workers)
    }

    /// Shut down, then wait for every session to end.
    pub fn wait(self) -> Result<()> {
        join_workers(self.shutdown()?);
        Ok(())
    }

    /// Serve until the intake thread stops on its own (a read failure on
    /// the registration FIFO), then drain the sessions.
    pub fn join(self) -> Result<()> {
        let result = self
            .intake
            .join()
            .map_err(|_| KvsError::Transport("intake thread panicked".to_string()))?;

        self.server.queue.close();
        join_workers(self.workers);
        channel::unlink_fifo(&self.server.config.register_pipe)?;
        result
    }
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if worker.join().is_err() {
            tracing::error!("Session worker panicked");
        }
    }
}

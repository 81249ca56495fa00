//! Client API
//!
//! Connects to a running server over named pipes. A connection owns three
//! FIFOs (request, response, notification) that it creates on connect and
//! unlinks when dropped.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam::channel::{self, Receiver};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map, map_res, value, verify},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use crate::channel as fifo;
use crate::error::{KvsError, Result};
use crate::protocol::{
    read_notification, read_response, write_registration, write_request, Notification, OpCode,
    Registration, Request, ResultCode, MAX_STRING_SIZE,
};

/// The three FIFO paths a client owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPaths {
    pub request: PathBuf,
    pub response: PathBuf,
    pub notification: PathBuf,
}

impl ClientPaths {
    /// `{dir}/req<id>`, `{dir}/resp<id>`, `{dir}/notif<id>`
    pub fn for_id(dir: &Path, id: &str) -> Self {
        Self {
            request: dir.join(format!("req{}", id)),
            response: dir.join(format!("resp{}", id)),
            notification: dir.join(format!("notif{}", id)),
        }
    }

    fn all(&self) -> [&Path; 3] {
        [
            self.request.as_path(),
            self.response.as_path(),
            self.notification.as_path(),
        ]
    }

    fn unlink(&self) {
        for path in self.all() {
            if let Err(e) = fifo::unlink_fifo(path) {
                tracing::warn!("Failed to unlink {}: {}", path.display(), e);
            }
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An open session with the server
pub struct Connection {
    id: String,
    paths: ClientPaths,
    request: File,
    response: File,
    notification: Option<File>,
}

impl Connection {
    /// Register with the server listening on `register_pipe`.
    ///
    /// Blocks until the server has opened this client's FIFOs and answered
    /// the CONNECT. Fails if the server refuses the id.
    pub fn connect(id: &str, paths: ClientPaths, register_pipe: &Path) -> Result<Self> {
        for path in paths.all() {
            if let Err(e) = fifo::create_fifo(path) {
                paths.unlink();
                return Err(e);
            }
        }

        match Self::handshake(id, &paths, register_pipe) {
            Ok((request, response, notification)) => {
                tracing::debug!(client = %id, "Connected");
                Ok(Self {
                    id: id.to_string(),
                    paths,
                    request,
                    response,
                    notification: Some(notification),
                })
            }
            Err(e) => {
                paths.unlink();
                Err(e)
            }
        }
    }

    fn handshake(id: &str, paths: &ClientPaths, register_pipe: &Path) -> Result<(File, File, File)> {
        let registration = Registration {
            request_path: paths.request.clone(),
            response_path: paths.response.clone(),
            notification_path: paths.notification.clone(),
            client_id: id.to_string(),
        };

        let mut register = fifo::open_write(register_pipe)?;
        write_registration(&mut register, &registration)?;
        drop(register);

        // Same order the server opens them in.
        let request = fifo::open_write(&paths.request)?;
        let mut response = fifo::open_read(&paths.response)?;
        let notification = fifo::open_read(&paths.notification)?;

        match read_response(&mut response)? {
            Some(r) if r.op == OpCode::Connect && r.is_ok() => Ok((request, response, notification)),
            Some(r) if r.op == OpCode::Connect => Err(KvsError::Transport(format!(
                "server refused client id {:?}",
                id
            ))),
            Some(r) => Err(KvsError::Protocol(format!(
                "expected CONNECT response, got {:?}",
                r.op
            ))),
            None => Err(KvsError::Transport(
                "server closed the response FIFO".to_string(),
            )),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn paths(&self) -> &ClientPaths {
        &self.paths
    }

    /// Subscribe to `key`. `Ok` means the key existed when subscribing.
    pub fn subscribe(&mut self, key: &str) -> Result<ResultCode> {
        self.call(Request::Subscribe {
            key: key.to_string(),
        })
    }

    /// Drop a subscription. `Ok` means one was removed.
    pub fn unsubscribe(&mut self, key: &str) -> Result<ResultCode> {
        self.call(Request::Unsubscribe {
            key: key.to_string(),
        })
    }

    /// End the session. The FIFOs are unlinked when `self` drops.
    pub fn disconnect(mut self) -> Result<ResultCode> {
        let result = self.call(Request::Disconnect)?;
        tracing::debug!(client = %self.id, "Disconnected");
        Ok(result)
    }

    fn call(&mut self, request: Request) -> Result<ResultCode> {
        let op = request.op_code();
        write_request(&mut self.request, &request)?;

        match read_response(&mut self.response)? {
            Some(response) if response.op == op => Ok(response.result),
            Some(response) => Err(KvsError::Protocol(format!(
                "expected {:?} response, got {:?}",
                op, response.op
            ))),
            None => Err(KvsError::Transport(
                "server closed the response FIFO".to_string(),
            )),
        }
    }

    /// Take the notification FIFO as a blocking iterator.
    ///
    /// Returns `None` if it was already taken.
    pub fn take_notifications(&mut self) -> Option<Notifications> {
        self.notification.take().map(|reader| Notifications { reader })
    }

    /// Read notifications on a background thread.
    ///
    /// The channel disconnects once the server closes the notification
    /// FIFO (after DISCONNECT or on server exit).
    pub fn notifications(&mut self) -> Result<Receiver<Notification>> {
        let stream = self.take_notifications().ok_or_else(|| {
            KvsError::Transport("notification stream already taken".to_string())
        })?;
        let (tx, rx) = channel::unbounded();

        thread::Builder::new()
            .name(format!("notif-{}", self.id))
            .spawn(move || {
                for notification in stream {
                    if tx.send(notification).is_err() {
                        break;
                    }
                }
            })?;

        Ok(rx)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.paths.unlink();
    }
}

/// Blocking iterator over notification frames. Ends at EOF or on a read
/// error.
pub struct Notifications {
    reader: File,
}

impl Iterator for Notifications {
    type Item = Notification;

    fn next(&mut self) -> Option<Notification> {
        match read_notification(&mut self.reader) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!("Failed to read from the notification FIFO: {}", e);
                None
            }
        }
    }
}

// =============================================================================
// Client commands
// =============================================================================

/// One line of client input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Subscribe(String),
    Unsubscribe(String),
    /// Pause for the given number of milliseconds
    Delay(u64),
    Disconnect,
    Empty,
    Invalid(String),
}

/// Parse one line of client input: `SUBSCRIBE [key]`, `UNSUBSCRIBE [key]`,
/// `DELAY <ms>` or `DISCONNECT`.
pub fn parse_client_command(line: &str) -> ClientCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return ClientCommand::Empty;
    }

    all_consuming(terminated(client_command, space0))(trimmed)
        .map(|(_, command)| command)
        .unwrap_or_else(|_: nom::Err<nom::error::Error<&str>>| {
            ClientCommand::Invalid(trimmed.to_string())
        })
}

fn client_command(input: &str) -> IResult<&str, ClientCommand> {
    alt((
        map(preceded(tuple((tag("SUBSCRIBE"), space1)), bracketed_key), ClientCommand::Subscribe),
        map(
            preceded(tuple((tag("UNSUBSCRIBE"), space1)), bracketed_key),
            ClientCommand::Unsubscribe,
        ),
        map(
            preceded(tuple((tag("DELAY"), space1)), map_res(digit1, str::parse::<u64>)),
            ClientCommand::Delay,
        ),
        value(ClientCommand::Disconnect, tag("DISCONNECT")),
    ))(input)
}

/// `[key]`
fn bracketed_key(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            tuple((char('['), space0)),
            verify(
                take_while1(|c: char| !matches!(c, '[' | ']' | ',') && !c.is_whitespace()),
                |key: &str| key.len() <= MAX_STRING_SIZE,
            ),
            tuple((space0, char(']'))),
        ),
        str::to_string,
    )(input)
}

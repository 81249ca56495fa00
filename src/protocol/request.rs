//! Request definitions
//!
//! Represents frames sent by clients.

use std::path::PathBuf;

/// Op-codes shared by requests and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Connect = b'1',
    Disconnect = b'2',
    Subscribe = b'3',
    Unsubscribe = b'4',
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'1' => Some(OpCode::Connect),
            b'2' => Some(OpCode::Disconnect),
            b'3' => Some(OpCode::Subscribe),
            b'4' => Some(OpCode::Unsubscribe),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A parsed request read from a client's request FIFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Only valid on the registration FIFO; ignored on a request FIFO
    Connect,

    /// End the session
    Disconnect,

    /// Subscribe to change notifications on a key
    Subscribe { key: String },

    /// Drop a subscription
    Unsubscribe { key: String },
}

impl Request {
    pub fn op_code(&self) -> OpCode {
        match self {
            Request::Connect => OpCode::Connect,
            Request::Disconnect => OpCode::Disconnect,
            Request::Subscribe { .. } => OpCode::Subscribe,
            Request::Unsubscribe { .. } => OpCode::Unsubscribe,
        }
    }
}

/// A registration read from the server's registration FIFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub request_path: PathBuf,
    pub response_path: PathBuf,
    pub notification_path: PathBuf,
    pub client_id: String,
}

//! Response definitions
//!
//! Represents frames sent back to clients.

use super::{OpCode, DELETED_SENTINEL};

/// Result digit of a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    Ok = b'0',
    Failed = b'1',
}

impl ResultCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(ResultCode::Ok),
            b'1' => Some(ResultCode::Failed),
            _ => None,
        }
    }
}

/// A response to a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Op-code of the request being answered
    pub op: OpCode,

    /// Outcome
    pub result: ResultCode,
}

impl Response {
    pub fn new(op: OpCode, result: ResultCode) -> Self {
        Self { op, result }
    }

    pub fn ok(op: OpCode) -> Self {
        Self::new(op, ResultCode::Ok)
    }

    pub fn failed(op: OpCode) -> Self {
        Self::new(op, ResultCode::Failed)
    }

    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok
    }
}

/// A change notification for a subscribed key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub key: String,
    pub value: String,
}

impl Notification {
    pub fn update(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn deleted(key: impl Into<String>) -> Self {
        Self::update(key, DELETED_SENTINEL)
    }

    /// True if this notification reports a delete
    pub fn is_delete(&self) -> bool {
        self.value == DELETED_SENTINEL
    }
}

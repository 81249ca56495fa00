//! Protocol Module
//!
//! Defines the wire protocol spoken over the named pipes.
//!
//! Every client owns three unidirectional FIFOs (request, response,
//! notification); the server owns one shared registration FIFO.
//!
//! ### Registration Frame (client → server, registration FIFO)
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ "0 <req_path> <resp_path> <notif_path> <client_id>" + NUL │  512 bytes
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Request Frame (client → server, request FIFO)
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │ Op (1)   │ Key (41, NUL-padded)         │   key only for SUB/UNSUB
//! └──────────┴──────────────────────────────┘
//! ```
//!
//! ### Response Frame (server → client, response FIFO)
//! ```text
//! ┌──────────┬──────────┐
//! │ Op (1)   │ Res (1)  │   ASCII digits, e.g. "30"
//! └──────────┴──────────┘
//! ```
//!
//! ### Notification Frame (server → client, notification FIFO)
//! ```text
//! ┌─────────────────────┬─────────────────────┐
//! │ Key (41, NUL-pad)   │ Value (41, NUL-pad) │   value may be "DELETED"
//! └─────────────────────┴─────────────────────┘
//! ```
//!
//! ### Op-codes
//! - 1: CONNECT (registration only)
//! - 2: DISCONNECT
//! - 3: SUBSCRIBE
//! - 4: UNSUBSCRIBE

mod request;
mod response;
mod codec;

pub use request::{OpCode, Registration, Request};
pub use response::{Notification, Response, ResultCode};
pub use codec::{
    decode_registration, decode_request, decode_response, encode_notification,
    encode_registration, encode_request, encode_response, read_notification,
    read_registration, read_request, read_response, write_notification,
    write_registration, write_request, write_response,
};

/// Maximum length of a key, value or client id
pub const MAX_STRING_SIZE: usize = 40;

/// Size of one NUL-padded key/value field on the wire
pub const STRING_FIELD_SIZE: usize = MAX_STRING_SIZE + 1;

/// Maximum length of a FIFO path carried in a registration frame
pub const MAX_PIPE_PATH_LENGTH: usize = 128;

/// Fixed size of a registration frame
pub const REGISTRATION_FRAME_SIZE: usize = 512;

/// Leading token of a registration frame
pub const REGISTRATION_TAG: &str = "0";

/// Size of a response frame
pub const RESPONSE_FRAME_SIZE: usize = 2;

/// Size of a notification (key frame + value frame)
pub const NOTIFICATION_FRAME_SIZE: usize = 2 * STRING_FIELD_SIZE;

/// Value sent to subscribers when their key is deleted
pub const DELETED_SENTINEL: &str = "DELETED";

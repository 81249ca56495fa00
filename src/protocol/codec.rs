//! Protocol codec
//!
//! Encoding and decoding functions for the pipe wire protocol.
//! Every frame has a fixed size, so the readers never need a length prefix:
//! they read the op-code byte, then exactly as many bytes as that op carries.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{KvsError, Result};
use super::{
    Notification, OpCode, Registration, Request, Response, ResultCode, MAX_PIPE_PATH_LENGTH,
    MAX_STRING_SIZE, NOTIFICATION_FRAME_SIZE, REGISTRATION_FRAME_SIZE, REGISTRATION_TAG,
    RESPONSE_FRAME_SIZE, STRING_FIELD_SIZE,
};

// =============================================================================
// Field helpers
// =============================================================================

/// Append `value` NUL-padded to `width` bytes.
fn put_field(buf: &mut BytesMut, value: &str, width: usize, what: &str) -> Result<()> {
    if value.len() >= width {
        return Err(KvsError::Protocol(format!(
            "{} too long: {} bytes (max {})",
            what,
            value.len(),
            width - 1
        )));
    }
    buf.put_slice(value.as_bytes());
    buf.put_bytes(0, width - value.len());
    Ok(())
}

/// Decode a NUL-terminated (or NUL-padded) text field.
fn decode_field(bytes: &[u8], what: &str) -> Result<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_string)
        .map_err(|e| KvsError::Protocol(format!("{} is not valid UTF-8: {}", what, e)))
}

/// Fill `buf` completely.
///
/// Returns `Ok(false)` if the stream ended before the first byte, which is
/// how a peer closing its end between frames looks. Interrupted reads are
/// retried; EOF inside a frame is an `UnexpectedEof` I/O error.
fn read_frame<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(KvsError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("truncated {} frame ({} of {} bytes)", what, filled, buf.len()),
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                tracing::trace!("Read of {} frame interrupted, retrying", what);
            }
            Err(e) => return Err(KvsError::from_io(e, what)),
        }
    }
    Ok(true)
}

fn write_frame<W: Write>(writer: &mut W, bytes: &[u8], what: &str) -> Result<()> {
    writer
        .write_all(bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| KvsError::from_io(e, what))
}

// =============================================================================
// Registration
// =============================================================================

fn path_token(path: &Path, what: &str) -> Result<String> {
    let text = path
        .to_str()
        .ok_or_else(|| KvsError::Protocol(format!("{} is not valid UTF-8", what)))?;
    if text.is_empty() || text.len() > MAX_PIPE_PATH_LENGTH {
        return Err(KvsError::Protocol(format!(
            "{} must be 1..={} bytes, got {}",
            what,
            MAX_PIPE_PATH_LENGTH,
            text.len()
        )));
    }
    if text.contains(char::is_whitespace) {
        return Err(KvsError::Protocol(format!("{} contains whitespace", what)));
    }
    Ok(text.to_string())
}

/// Encode a registration into its fixed-size frame
///
/// Format: `"0 <req> <resp> <notif> <id>"`, NUL-padded to 512 bytes
pub fn encode_registration(registration: &Registration) -> Result<Bytes> {
    let id = &registration.client_id;
    if id.is_empty() || id.len() > MAX_STRING_SIZE || id.contains(char::is_whitespace) {
        return Err(KvsError::Protocol(format!("invalid client id {:?}", id)));
    }

    let text = format!(
        "{} {} {} {} {}",
        REGISTRATION_TAG,
        path_token(&registration.request_path, "request path")?,
        path_token(&registration.response_path, "response path")?,
        path_token(&registration.notification_path, "notification path")?,
        id
    );

    let mut buf = BytesMut::with_capacity(REGISTRATION_FRAME_SIZE);
    put_field(&mut buf, &text, REGISTRATION_FRAME_SIZE, "registration")?;
    Ok(buf.freeze())
}

/// Decode a registration frame
pub fn decode_registration(bytes: &[u8]) -> Result<Registration> {
    let text = decode_field(bytes, "registration")?;
    let tokens: Vec<&str> = text.split_whitespace().collect();

    match tokens.as_slice() {
        [tag, req, resp, notif, id] if *tag == REGISTRATION_TAG => {
            if id.len() > MAX_STRING_SIZE {
                return Err(KvsError::Protocol(format!("client id too long: {:?}", id)));
            }
            Ok(Registration {
                request_path: PathBuf::from(req),
                response_path: PathBuf::from(resp),
                notification_path: PathBuf::from(notif),
                client_id: id.to_string(),
            })
        }
        _ => Err(KvsError::Protocol(format!(
            "malformed registration frame: {:?}",
            text
        ))),
    }
}

/// Read one registration frame; `None` once every writer has closed the FIFO
pub fn read_registration<R: Read>(reader: &mut R) -> Result<Option<Registration>> {
    let mut frame = [0u8; REGISTRATION_FRAME_SIZE];
    if !read_frame(reader, &mut frame, "registration")? {
        return Ok(None);
    }
    decode_registration(&frame).map(Some)
}

/// Write a registration frame
pub fn write_registration<W: Write>(writer: &mut W, registration: &Registration) -> Result<()> {
    let bytes = encode_registration(registration)?;
    write_frame(writer, &bytes, "registration")
}

// =============================================================================
// Requests
// =============================================================================

/// Encode a request
///
/// Format: op (1) [+ key (41) for SUBSCRIBE/UNSUBSCRIBE]
pub fn encode_request(request: &Request) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(1 + STRING_FIELD_SIZE);
    buf.put_u8(request.op_code().as_byte());

    match request {
        Request::Subscribe { key } | Request::Unsubscribe { key } => {
            put_field(&mut buf, key, STRING_FIELD_SIZE, "key")?;
        }
        Request::Connect | Request::Disconnect => {}
    }

    Ok(buf.freeze())
}

/// Decode a complete request frame
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    let (&op_byte, payload) = bytes
        .split_first()
        .ok_or_else(|| KvsError::Protocol("empty request frame".to_string()))?;

    let op = OpCode::from_byte(op_byte).ok_or_else(|| {
        KvsError::Protocol(format!("Unknown op-code: 0x{:02x}", op_byte))
    })?;

    match op {
        OpCode::Connect => Ok(Request::Connect),
        OpCode::Disconnect => Ok(Request::Disconnect),
        OpCode::Subscribe | OpCode::Unsubscribe => {
            if payload.len() < STRING_FIELD_SIZE {
                return Err(KvsError::Protocol(format!(
                    "incomplete key (expected {}, got {})",
                    STRING_FIELD_SIZE,
                    payload.len()
                )));
            }
            let key = decode_field(&payload[..STRING_FIELD_SIZE], "key")?;
            if op == OpCode::Subscribe {
                Ok(Request::Subscribe { key })
            } else {
                Ok(Request::Unsubscribe { key })
            }
        }
    }
}

/// Read one request; `None` when the client closed its request FIFO
pub fn read_request<R: Read>(reader: &mut R) -> Result<Option<Request>> {
    let mut op = [0u8; 1];
    if !read_frame(reader, &mut op, "request")? {
        return Ok(None);
    }

    match OpCode::from_byte(op[0]) {
        Some(OpCode::Subscribe) | Some(OpCode::Unsubscribe) => {
            let mut frame = [0u8; 1 + STRING_FIELD_SIZE];
            frame[0] = op[0];
            if !read_frame(reader, &mut frame[1..], "request key")? {
                return Err(KvsError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "request FIFO closed before key",
                )));
            }
            decode_request(&frame).map(Some)
        }
        _ => decode_request(&op).map(Some),
    }
}

/// Write a request
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    let bytes = encode_request(request)?;
    write_frame(writer, &bytes, "request")
}

// =============================================================================
// Responses
// =============================================================================

/// Encode a response: op-code digit followed by result digit
pub fn encode_response(response: &Response) -> [u8; RESPONSE_FRAME_SIZE] {
    [response.op.as_byte(), response.result as u8]
}

/// Decode a response frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    if bytes.len() < RESPONSE_FRAME_SIZE {
        return Err(KvsError::Protocol(format!(
            "Incomplete response: expected {} bytes, got {}",
            RESPONSE_FRAME_SIZE,
            bytes.len()
        )));
    }

    let op = OpCode::from_byte(bytes[0])
        .ok_or_else(|| KvsError::Protocol(format!("Unknown op-code: 0x{:02x}", bytes[0])))?;
    let result = ResultCode::from_byte(bytes[1])
        .ok_or_else(|| KvsError::Protocol(format!("Unknown result: 0x{:02x}", bytes[1])))?;

    Ok(Response { op, result })
}

/// Read one response; `None` when the server closed the response FIFO
pub fn read_response<R: Read>(reader: &mut R) -> Result<Option<Response>> {
    let mut frame = [0u8; RESPONSE_FRAME_SIZE];
    if !read_frame(reader, &mut frame, "response")? {
        return Ok(None);
    }
    decode_response(&frame).map(Some)
}

/// Write a response
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    write_frame(writer, &encode_response(response), "response")
}

// =============================================================================
// Notifications
// =============================================================================

/// Encode a notification as key frame followed by value frame
pub fn encode_notification(notification: &Notification) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(NOTIFICATION_FRAME_SIZE);
    put_field(&mut buf, &notification.key, STRING_FIELD_SIZE, "key")?;
    put_field(&mut buf, &notification.value, STRING_FIELD_SIZE, "value")?;
    Ok(buf.freeze())
}

/// Read one notification; `None` when the server closed the FIFO
pub fn read_notification<R: Read>(reader: &mut R) -> Result<Option<Notification>> {
    let mut frame = [0u8; NOTIFICATION_FRAME_SIZE];
    if !read_frame(reader, &mut frame, "notification")? {
        return Ok(None);
    }
    Ok(Some(Notification {
        key: decode_field(&frame[..STRING_FIELD_SIZE], "key")?,
        value: decode_field(&frame[STRING_FIELD_SIZE..], "value")?,
    }))
}

/// Write a notification
pub fn write_notification<W: Write>(writer: &mut W, notification: &Notification) -> Result<()> {
    let bytes = encode_notification(notification)?;
    write_frame(writer, &bytes, "notification")
}

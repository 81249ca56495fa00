//! Tests for the pipe protocol codec
//!
//! These tests verify:
//! - Exact byte layout of every frame type
//! - Registration frame text and path/id limits
//! - Malformed and truncated frames are rejected
//! - Clean EOF between frames is reported as `None`

use std::io::Cursor;
use std::path::PathBuf;

use pipekv::protocol::{
    decode_registration, decode_request, decode_response, encode_notification,
    encode_registration, encode_request, encode_response, read_notification, read_registration,
    read_request, read_response, write_notification, write_request, Notification, OpCode,
    Registration, Request, Response, ResultCode, DELETED_SENTINEL, MAX_PIPE_PATH_LENGTH,
    NOTIFICATION_FRAME_SIZE, REGISTRATION_FRAME_SIZE, STRING_FIELD_SIZE,
};
use pipekv::KvsError;

fn registration(id: &str) -> Registration {
    Registration {
        request_path: PathBuf::from("/tmp/req1"),
        response_path: PathBuf::from("/tmp/resp1"),
        notification_path: PathBuf::from("/tmp/notif1"),
        client_id: id.to_string(),
    }
}

// =============================================================================
// Request Frames
// =============================================================================

#[test]
fn test_subscribe_frame_layout() {
    let bytes = encode_request(&Request::Subscribe {
        key: "apple".to_string(),
    })
    .unwrap();

    assert_eq!(bytes.len(), 1 + STRING_FIELD_SIZE);
    assert_eq!(bytes[0], b'3');
    assert_eq!(&bytes[1..6], b"apple");
    assert!(bytes[6..].iter().all(|&b| b == 0));
}

#[test]
fn test_disconnect_frame_is_one_byte() {
    let bytes = encode_request(&Request::Disconnect).unwrap();
    assert_eq!(&bytes[..], b"2");
}

#[test]
fn test_read_request_sequence_then_eof() {
    let mut buf = Vec::new();
    write_request(&mut buf, &Request::Unsubscribe { key: "k".into() }).unwrap();
    write_request(&mut buf, &Request::Disconnect).unwrap();

    let mut reader = Cursor::new(buf);
    assert_eq!(
        read_request(&mut reader).unwrap(),
        Some(Request::Unsubscribe { key: "k".into() })
    );
    assert_eq!(read_request(&mut reader).unwrap(), Some(Request::Disconnect));
    assert_eq!(read_request(&mut reader).unwrap(), None);
}

#[test]
fn test_unknown_op_code_rejected() {
    assert!(matches!(decode_request(b"7"), Err(KvsError::Protocol(_))));
    assert!(matches!(decode_request(b""), Err(KvsError::Protocol(_))));
    assert!(matches!(
        read_request(&mut Cursor::new(b"x".to_vec())),
        Err(KvsError::Protocol(_))
    ));
}

#[test]
fn test_op_code_bytes() {
    assert_eq!(OpCode::Connect.as_byte(), b'1');
    assert_eq!(OpCode::Disconnect.as_byte(), b'2');
    assert_eq!(OpCode::Subscribe.as_byte(), b'3');
    assert_eq!(OpCode::Unsubscribe.as_byte(), b'4');
    assert_eq!(OpCode::from_byte(b'5'), None);
}

// =============================================================================
// Response Frames
// =============================================================================

#[test]
fn test_response_frames_are_ascii_digits() {
    assert_eq!(&encode_response(&Response::ok(OpCode::Subscribe)), b"30");
    assert_eq!(&encode_response(&Response::failed(OpCode::Unsubscribe)), b"41");
    assert_eq!(&encode_response(&Response::ok(OpCode::Disconnect)), b"20");
    assert_eq!(&encode_response(&Response::failed(OpCode::Connect)), b"11");
}

#[test]
fn test_decode_response() {
    let response = decode_response(b"31").unwrap();
    assert_eq!(response.op, OpCode::Subscribe);
    assert_eq!(response.result, ResultCode::Failed);
    assert!(!response.is_ok());

    assert!(decode_response(b"3").is_err());
    assert!(decode_response(b"39").is_err());
}

#[test]
fn test_read_response_eof() {
    assert_eq!(read_response(&mut Cursor::new(Vec::new())).unwrap(), None);
}

// =============================================================================
// Notification Frames
// =============================================================================

#[test]
fn test_notification_frame_layout() {
    let bytes = encode_notification(&Notification::update("banana", "2")).unwrap();

    assert_eq!(bytes.len(), NOTIFICATION_FRAME_SIZE);
    assert_eq!(&bytes[..6], b"banana");
    assert_eq!(bytes[6], 0);
    assert_eq!(bytes[STRING_FIELD_SIZE], b'2');
    assert_eq!(bytes[STRING_FIELD_SIZE + 1], 0);
}

#[test]
fn test_deleted_notification() {
    let n = Notification::deleted("banana");
    assert_eq!(n.value, DELETED_SENTINEL);
    assert!(n.is_delete());

    let mut buf = Vec::new();
    write_notification(&mut buf, &n).unwrap();
    let back = read_notification(&mut Cursor::new(buf)).unwrap().unwrap();
    assert!(back.is_delete());
}

#[test]
fn test_truncated_notification_is_disconnect() {
    let bytes = encode_notification(&Notification::update("k", "v")).unwrap();
    let mut reader = Cursor::new(bytes[..50].to_vec());

    let err = read_notification(&mut reader).unwrap_err();
    assert!(err.is_disconnect());
}

// =============================================================================
// Registration Frames
// =============================================================================

#[test]
fn test_registration_frame_text() {
    let bytes = encode_registration(&registration("7")).unwrap();
    assert_eq!(bytes.len(), REGISTRATION_FRAME_SIZE);

    let text_len = bytes.iter().position(|&b| b == 0).unwrap();
    assert_eq!(
        std::str::from_utf8(&bytes[..text_len]).unwrap(),
        "0 /tmp/req1 /tmp/resp1 /tmp/notif1 7"
    );
    assert_eq!(decode_registration(&bytes).unwrap(), registration("7"));
}

#[test]
fn test_read_registration() {
    let bytes = encode_registration(&registration("abc")).unwrap();
    let mut reader = Cursor::new(bytes.to_vec());

    assert_eq!(read_registration(&mut reader).unwrap(), Some(registration("abc")));
    assert_eq!(read_registration(&mut reader).unwrap(), None);
}

#[test]
fn test_registration_limits() {
    assert!(encode_registration(&registration("")).is_err());
    assert!(encode_registration(&registration("two words")).is_err());
    assert!(encode_registration(&registration(&"i".repeat(41))).is_err());

    let mut long_path = registration("1");
    long_path.request_path = PathBuf::from(format!("/{}", "p".repeat(MAX_PIPE_PATH_LENGTH)));
    assert!(encode_registration(&long_path).is_err());
}

#[test]
fn test_malformed_registration_rejected() {
    let mut frame = vec![0u8; REGISTRATION_FRAME_SIZE];
    assert!(decode_registration(&frame).is_err());

    frame[..11].copy_from_slice(b"9 a b c idx");
    assert!(decode_registration(&frame).is_err());

    frame[..11].copy_from_slice(b"0 a b c idx");
    let decoded = decode_registration(&frame).unwrap();
    assert_eq!(decoded.client_id, "idx");
}

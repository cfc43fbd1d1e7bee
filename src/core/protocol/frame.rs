// src/core/protocol/frame.rs

//! The `RespFrame` type and its binary-safe, incremental parser.
//!
//! Unlike a naive line-splitting reader, this parser treats bulk strings as
//! opaque byte payloads of a declared length and never assumes CRLF cannot
//! appear inside one. Every entry point either returns a fully parsed frame
//! together with the number of bytes it consumed, or `Ok(None)` to signal
//! that the buffer does not yet hold a complete frame and the caller must
//! wait for more bytes before trying again.

use crate::core::error::ServerError;
use bytes::Bytes;

/// Limits chosen to bound a single misbehaving client's memory footprint;
/// well above anything the command set in this server ever needs.
const MAX_INLINE_LEN: usize = 64 * 1024;
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: i64 = 1024 * 1024;

const CRLF: &[u8] = b"\r\n";

/// A single RESP value, covering the frame types this server both accepts
/// from clients and emits in replies.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    NullBulkString,
    Array(Vec<RespFrame>),
    NullArray,
}

impl RespFrame {
    pub fn ok() -> Self {
        RespFrame::SimpleString("OK".into())
    }

    pub fn bulk(bytes: impl Into<Bytes>) -> Self {
        RespFrame::BulkString(bytes.into())
    }

    pub fn array(items: Vec<RespFrame>) -> Self {
        RespFrame::Array(items)
    }

    /// Parses one frame from the front of `src`. Returns `Ok(None)` when
    /// `src` holds a prefix of a valid frame but not all of it yet; the
    /// caller must leave the buffer untouched and retry after more bytes
    /// arrive. Returns `Err` only for input that can never become valid.
    pub fn parse(src: &[u8]) -> Result<Option<(RespFrame, usize)>, ServerError> {
        if src.is_empty() {
            return Ok(None);
        }
        match src[0] {
            b'+' => parse_simple(&src[1..]).map(|o| shift(o, |s| RespFrame::SimpleString(s))),
            b'-' => parse_simple(&src[1..]).map(|o| shift(o, RespFrame::Error)),
            b':' => parse_integer_line(&src[1..]).map(|o| shift(o, RespFrame::Integer)),
            b'$' => parse_bulk_string(&src[1..]),
            b'*' => parse_array(&src[1..]),
            other => Err(ServerError::Protocol(format!(
                "invalid frame type byte '{}'",
                other as char
            ))),
        }
    }

    /// Serializes this frame onto `buf` in wire format.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            RespFrame::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                buf.push(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespFrame::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                buf.push(b'$');
                buf.extend_from_slice(b.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(b);
                buf.extend_from_slice(CRLF);
            }
            RespFrame::NullBulkString => buf.extend_from_slice(b"$-1\r\n"),
            RespFrame::Array(items) => {
                buf.push(b'*');
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for item in items {
                    item.encode(buf);
                }
            }
            RespFrame::NullArray => buf.extend_from_slice(b"*-1\r\n"),
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Locates the first `\r\n` in `src`, bounding the scan to avoid pathological
/// memory growth on a client that never sends a terminator.
fn find_crlf(src: &[u8]) -> Option<usize> {
    let scan_limit = src.len().min(MAX_INLINE_LEN);
    src[..scan_limit].windows(2).position(|w| w == CRLF)
}

/// Shifts a `(T, consumed)` pair's consumed count by 1 (the leading type
/// byte) and maps `T` into a `RespFrame` via `ctor`.
fn shift<T>(opt: Option<(T, usize)>, ctor: impl FnOnce(T) -> RespFrame) -> (RespFrame, usize) {
    let (v, consumed) = opt.expect("caller only invokes shift on Some");
    (ctor(v), consumed + 1)
}

fn parse_simple(src: &[u8]) -> Result<Option<(String, usize)>, ServerError> {
    let Some(pos) = find_crlf(src) else {
        if src.len() > MAX_INLINE_LEN {
            return Err(ServerError::Protocol("inline line too long".into()));
        }
        return Ok(None);
    };
    let line = std::str::from_utf8(&src[..pos])
        .map_err(|_| ServerError::Protocol("non-UTF-8 simple string".into()))?
        .to_string();
    Ok(Some((line, pos + 2)))
}

fn parse_integer_line(src: &[u8]) -> Result<Option<(i64, usize)>, ServerError> {
    let Some(pos) = find_crlf(src) else {
        return Ok(None);
    };
    let n = std::str::from_utf8(&src[..pos])
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| ServerError::Protocol("invalid integer".into()))?;
    Ok(Some((n, pos + 2)))
}

fn parse_bulk_string(src: &[u8]) -> Result<Option<(RespFrame, usize)>, ServerError> {
    let Some((len, header_consumed)) = parse_integer_line(src)? else {
        return Ok(None);
    };
    // `$-1\r\n` denotes a null bulk string.
    if len == -1 {
        return Ok(Some((RespFrame::NullBulkString, 1 + header_consumed)));
    }
    if len < 0 || len > MAX_BULK_LEN {
        return Err(ServerError::Protocol("invalid bulk string length".into()));
    }
    let len = len as usize;
    let body_start = header_consumed;
    let needed = body_start + len + 2;
    if src.len() < needed {
        return Ok(None);
    }
    if &src[body_start + len..body_start + len + 2] != CRLF {
        return Err(ServerError::Protocol(
            "bulk string missing trailing CRLF".into(),
        ));
    }
    let payload = Bytes::copy_from_slice(&src[body_start..body_start + len]);
    Ok(Some((RespFrame::BulkString(payload), 1 + needed)))
}

fn parse_array(src: &[u8]) -> Result<Option<(RespFrame, usize)>, ServerError> {
    let Some((count, mut consumed)) = parse_integer_line(src)? else {
        return Ok(None);
    };
    if count == -1 {
        return Ok(Some((RespFrame::NullArray, 1 + consumed)));
    }
    if count < 0 || count > MAX_ARRAY_LEN {
        return Err(ServerError::Protocol("invalid array length".into()));
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let Some((frame, item_consumed)) = RespFrame::parse(&src[consumed..])? else {
            return Ok(None);
        };
        items.push(frame);
        consumed += item_consumed;
    }
    Ok(Some((RespFrame::Array(items), 1 + consumed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_string() {
        let (frame, n) = RespFrame::parse(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(frame, RespFrame::SimpleString("OK".into()));
        assert_eq!(n, 5);
    }

    #[test]
    fn parses_binary_safe_bulk_string() {
        let input = b"$5\r\nhe\r\n\xff\r\n";
        let (frame, n) = RespFrame::parse(input).unwrap().unwrap();
        assert_eq!(frame, RespFrame::BulkString(Bytes::from_static(b"he\r\n\xff")));
        assert_eq!(n, input.len());
    }

    #[test]
    fn reports_incomplete_on_partial_bulk_string() {
        let full = b"$5\r\nhello\r\n";
        for split in 1..full.len() {
            let (head, tail) = full.split_at(split);
            assert_eq!(RespFrame::parse(head).unwrap(), None);
            let mut buf = head.to_vec();
            buf.extend_from_slice(tail);
            let (frame, n) = RespFrame::parse(&buf).unwrap().unwrap();
            assert_eq!(frame, RespFrame::BulkString(Bytes::from_static(b"hello")));
            assert_eq!(n, full.len());
        }
    }

    #[test]
    fn parses_nested_array() {
        let input = b"*2\r\n$4\r\nPING\r\n$-1\r\n";
        let (frame, n) = RespFrame::parse(input).unwrap().unwrap();
        assert_eq!(
            frame,
            RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"PING")),
                RespFrame::NullBulkString,
            ])
        );
        assert_eq!(n, input.len());
    }

    #[test]
    fn rejects_invalid_type_byte() {
        assert!(RespFrame::parse(b"!nope\r\n").is_err());
    }

    #[test]
    fn round_trips_array_encoding() {
        let frame = RespFrame::array(vec![
            RespFrame::bulk(&b"SET"[..]),
            RespFrame::bulk(&b"k"[..]),
            RespFrame::bulk(&b"v"[..]),
        ]);
        let bytes = frame.encode_to_vec();
        let (decoded, n) = RespFrame::parse(&bytes).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(n, bytes.len());
    }
}

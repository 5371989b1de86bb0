//! Incremental Request Parser
//!
//! This module parses inbound requests into [`Command`] values. A request is
//! either a length-prefixed array of bulk strings (`*2\r\n$3\r\nGET\r\n...`)
//! or a bare line of whitespace-separated tokens (the "inline" form used by
//! humans over telnet).
//!
//! ## How the Parser Works
//!
//! The caller accumulates socket bytes in a buffer and calls
//! [`parse_request`], which returns:
//!
//! - `Ok(Some((request, consumed)))` - a full frame, `consumed` bytes used
//! - `Ok(None)` - the frame is incomplete, read more bytes and retry
//! - `Err(FrameError)` - the frame is malformed; the connection is beyond
//!   recovery and must be closed
//!
//! A `*-1` request parses successfully as `Request::Empty` and is simply
//! discarded by the caller. A `$-1` element is preserved as an empty-string
//! argument.

use crate::protocol::types::CRLF;
use thiserror::Error;

/// Errors that make the inbound byte stream unparseable.
///
/// Any of these terminates the connection: once framing is lost there is no
/// way to find the start of the next request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    /// A `*` or `$` line whose length is not a decimal integer
    #[error("malformed length prefix: {0:?}")]
    BadLength(String),

    /// A bulk length below -1
    #[error("invalid bulk length: {0}")]
    BadBulkLength(i64),

    /// An array element that does not start with `$`
    #[error("expected bulk string header")]
    ExpectedBulk,

    /// A bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingTerminator,

    /// Request bytes that are not valid UTF-8
    #[error("invalid UTF-8 in request")]
    InvalidUtf8,

    /// A request with no tokens at all
    #[error("empty command")]
    EmptyCommand,

    /// A single bulk string over the size cap
    #[error("bulk string too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, FrameError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one request frame
pub const MAX_FRAME_ELEMENTS: i64 = 1024 * 1024;

/// A parsed request: an uppercased command name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name, uppercased at parse time
    pub name: String,
    /// Positional arguments, in wire order
    pub args: Vec<String>,
}

impl Command {
    /// Builds a command from raw tokens. The first token becomes the
    /// (uppercased) name; the rest become arguments.
    pub fn from_tokens(mut tokens: Vec<String>) -> ParseResult<Self> {
        if tokens.is_empty() {
            return Err(FrameError::EmptyCommand);
        }
        let args = tokens.split_off(1);
        let name = tokens
            .into_iter()
            .next()
            .map(|t| t.to_ascii_uppercase())
            .ok_or(FrameError::EmptyCommand)?;
        Ok(Self { name, args })
    }
}

/// One successfully framed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// A command to execute
    Command(Command),
    /// A negative-count array frame; carries nothing and is discarded
    Empty,
}

/// Attempts to parse one request from the front of `buf`.
///
/// See the module docs for the `Ok(None)` / `Ok(Some)` / `Err` contract.
pub fn parse_request(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] == b'*' {
        parse_array_request(buf)
    } else {
        parse_inline_request(buf)
    }
}

/// Parses the `*<count>` array-of-bulk-strings form.
fn parse_array_request(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
    debug_assert!(buf[0] == b'*');

    let count_end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let count = parse_length(&buf[1..1 + count_end])?;
    let mut consumed = 1 + count_end + 2;

    // A negative count is the no-op request: nothing follows the header.
    if count < 0 {
        return Ok(Some((Request::Empty, consumed)));
    }
    if count > MAX_FRAME_ELEMENTS {
        return Err(FrameError::BadLength(count.to_string()));
    }

    let mut tokens = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let rest = &buf[consumed..];
        if rest.is_empty() {
            return Ok(None);
        }
        if rest[0] != b'$' {
            return Err(FrameError::ExpectedBulk);
        }

        let len_end = match find_crlf(&rest[1..]) {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let len = parse_length(&rest[1..1 + len_end])?;

        // `$-1` is preserved as an empty-string argument; anything else
        // negative is malformed.
        if len == -1 {
            tokens.push(String::new());
            consumed += 1 + len_end + 2;
            continue;
        }
        if len < 0 {
            return Err(FrameError::BadBulkLength(len));
        }

        let len = len as usize;
        if len > MAX_BULK_SIZE {
            return Err(FrameError::TooLarge {
                size: len,
                max: MAX_BULK_SIZE,
            });
        }

        let data_start = 1 + len_end + 2;
        let total = data_start + len + 2;
        if rest.len() < total {
            return Ok(None);
        }
        if &rest[data_start + len..total] != CRLF {
            return Err(FrameError::MissingTerminator);
        }

        let token = std::str::from_utf8(&rest[data_start..data_start + len])
            .map_err(|_| FrameError::InvalidUtf8)?;
        tokens.push(token.to_string());
        consumed += total;
    }

    let command = Command::from_tokens(tokens)?;
    Ok(Some((Request::Command(command), consumed)))
}

/// Parses the inline form: one line split on whitespace.
fn parse_inline_request(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
    let crlf_pos = match find_crlf(buf) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let line = std::str::from_utf8(&buf[..crlf_pos]).map_err(|_| FrameError::InvalidUtf8)?;
    let tokens: Vec<String> = line.split_whitespace().map(|s| s.to_string()).collect();

    let command = Command::from_tokens(tokens)?;
    Ok(Some((Request::Command(command), crlf_pos + 2)))
}

fn parse_length(raw: &[u8]) -> ParseResult<i64> {
    let s = std::str::from_utf8(raw).map_err(|_| FrameError::InvalidUtf8)?;
    s.parse()
        .map_err(|_| FrameError::BadLength(s.to_string()))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r`, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    for i in 0..buf.len().saturating_sub(1) {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
    }
    None
}

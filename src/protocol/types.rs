//! Wire Reply Types
//!
//! This module defines the reply shapes the server writes back to clients.
//! The wire format is RESP (Redis Serialization Protocol): every reply
//! starts with a one-byte type prefix and every line ends with CRLF.
//!
//! ## Reply Shapes
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Nil Bulk: `$-1\r\n`
//! Array: `*2\r\n<element><element>`
//!
//! The empty bulk string (`$0\r\n\r\n`) and the nil bulk (`$-1\r\n`) are
//! distinct values: an empty string is a real value, nil means "no value".
//! Handlers reply [`Reply::Nil`] explicitly for missing keys.

use std::fmt;

/// The CRLF terminator used by the wire protocol
pub const CRLF: &[u8] = b"\r\n";

/// Wire protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply value to be serialized onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Non-binary status line, e.g. `+OK`.
    Simple(String),

    /// Error line, e.g. `-ERR unknown command`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42`.
    Integer(i64),

    /// Length-prefixed string value. An empty string serializes as `$0`.
    Bulk(String),

    /// The nil bulk (`$-1`), used for "no such value".
    Nil,

    /// Array of replies: a `*N` header followed by N serialized elements.
    Array(Vec<Reply>),
}

impl Reply {
    /// Creates a status reply.
    pub fn simple(s: impl Into<String>) -> Self {
        Reply::Simple(s.into())
    }

    /// Creates an error reply.
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Creates an integer reply.
    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a bulk string reply.
    pub fn bulk(s: impl Into<String>) -> Self {
        Reply::Bulk(s.into())
    }

    /// The `+OK` status.
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    /// Integer reply for a boolean outcome (`:1` / `:0`).
    pub fn from_bool(b: bool) -> Self {
        Reply::Integer(i64::from(b))
    }

    /// Serializes the reply to a fresh byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Simple(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(s) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(s.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Nil => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Simple(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(s) => write!(f, "\"{}\"", s),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

//! Command Surface
//!
//! This module implements the command layer: the static registry mapping
//! command names to handler descriptors, and the handlers themselves.
//!
//! ## Dispatch Path
//!
//! ```text
//! parsed Command
//!       │
//!       ▼
//! registry lookup ── unknown name ──> error reply
//!       │
//!       ▼
//! arity validation ── violation ────> error reply
//!       │
//!       ├─ no-wait ──> connection handler (session state only)
//!       │
//!       └─ store ────> database dispatcher ──> store handler
//! ```
//!
//! Every failure below the protocol layer is recovered at the single-command
//! boundary: the handler returns a [`CommandError`], the caller writes it as
//! an error reply, and the connection keeps going.

pub mod handler;
pub mod registry;

use thiserror::Error;

use crate::storage::StoreError;

// Re-export the registry entry points
pub use registry::{lookup, CommandSpec, Handler};

/// Errors produced by command validation and execution. Display output is
/// the exact wire error text.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    /// Name not present in the registry
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    /// Argument count violating the arity contract
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// Malformed option tokens, e.g. `SET ... EX` with no value
    #[error("ERR syntax error")]
    Syntax,

    /// SELECT/MOVE target outside the configured database range
    #[error("ERR DB index is out of range")]
    InvalidDbIndex,

    /// Authentication required and absent
    #[error("ERR operation not permitted")]
    NotPermitted,

    /// AUTH with a wrong (or unconfigured) password
    #[error("ERR invalid password")]
    InvalidPassword,

    /// Keyspace-level failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    /// Wrong-arity error for a command, with the name lowercased the way
    /// the wire text expects.
    pub fn wrong_arity(name: &str) -> Self {
        CommandError::WrongArity(name.to_lowercase())
    }
}

//! Client Connections
//!
//! Each accepted TCP connection runs on its own task: a loop that reads
//! bytes, parses requests, routes commands, and writes replies. Commands
//! touching a database store are handed to that database's dispatcher;
//! no-wait commands run right here against the connection's [`Session`].
//!
//! ## Session State
//!
//! A [`Session`] is everything the server remembers about one connection:
//! the selected database, the authentication flag, and the transaction
//! queue. Nothing in it is shared, which is exactly why no-wait commands
//! can skip the dispatcher.

pub mod handler;

use crate::protocol::Command;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler};

/// Per-connection state.
#[derive(Debug, Default)]
pub struct Session {
    /// Index of the selected logical database
    pub db: usize,
    /// Set once AUTH succeeds; meaningless when no password is required
    pub authenticated: bool,
    /// Set by MULTI; cleared by EXEC
    pub in_multi: bool,
    /// Commands queued while `in_multi`, executed only by EXEC
    pub pending: Vec<Command>,
}

impl Session {
    /// A fresh session: database 0, unauthenticated, no transaction.
    pub fn new() -> Self {
        Self::default()
    }
}

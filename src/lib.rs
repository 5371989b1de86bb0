//! # emberkv - An In-Memory, Multi-Database Key-Value Server
//!
//! emberkv is a Redis-compatible, memory-resident key-value server written
//! in Rust. It speaks the RESP wire protocol and exposes string, list, and
//! set data types with per-key expiration across multiple logical
//! databases.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            emberkv                               │
//! │                                                                  │
//! │  ┌────────────┐     ┌──────────────┐      ┌───────────────────┐  │
//! │  │ TCP Server │────>│  Connection  │─────>│ no-wait commands  │  │
//! │  │ (accept)   │     │  Handler     │      │ (session state)   │  │
//! │  └────────────┘     └──────┬───────┘      └───────────────────┘  │
//! │                            │ queue handoff                       │
//! │                            ▼                                     │
//! │  ┌──────────────────────────────────────────────────────────┐    │
//! │  │   Dispatcher workers — one per logical database          │    │
//! │  │  ┌────────┐  ┌────────┐  ┌────────┐       ┌────────┐     │    │
//! │  │  │ db 0   │  │ db 1   │  │ db 2   │  ...  │ db N   │     │    │
//! │  │  │ worker │  │ worker │  │ worker │       │ worker │     │    │
//! │  │  └───┬────┘  └───┬────┘  └───┬────┘       └───┬────┘     │    │
//! │  │      ▼           ▼           ▼                ▼          │    │
//! │  │   Keyspace    Keyspace    Keyspace         Keyspace      │    │
//! │  │   Store 0     Store 1     Store 2          Store N       │    │
//! │  └──────────────────────────────▲───────────────────────────┘    │
//! │                                 │ sweeps through the same queues  │
//! │                    ┌────────────┴────────────┐                    │
//! │                    │  Active-Expiration      │                    │
//! │                    │  Cycle (background)     │                    │
//! │                    └─────────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! One task per connection, one dispatcher worker per logical database, one
//! background expiration task. A database's worker is the sole mutator of
//! its store: commands are handed over a single-slot queue and executed in
//! arrival order, so the keyspace code never needs per-key locking.
//! Commands that touch only connection state (AUTH, ECHO, PING, SELECT,
//! MULTI) skip the queue entirely.
//!
//! ## Expiry
//!
//! Keys with a deadline are evicted lazily on access, and proactively by
//! the background cycle, which samples the expiration index through the
//! same dispatcher queues client commands use.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP request parsing and reply serialization
//! - [`storage`]: the keyspace stores, object model, and expiration cycle
//! - [`commands`]: the command registry and handlers
//! - [`dispatch`]: the per-database dispatcher workers
//! - [`connection`]: client connection handling and session state
//! - [`server`]: shared server state and the accept loop
//! - [`glob`]: glob pattern matching for KEYS

pub mod commands;
pub mod connection;
pub mod dispatch;
pub mod glob;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandError;
pub use connection::{handle_connection, Session};
pub use protocol::{Command, FrameError, Reply};
pub use server::{Server, ServerConfig};
pub use storage::{Db, ExpiryCycle, StoreError};

/// The default port emberkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host emberkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of emberkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

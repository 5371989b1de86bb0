//! Keyspace Storage
//!
//! This module implements the in-memory keyspace: the per-database
//! [`Db`] store, the tagged [`Object`] model, the list and set structures,
//! and the active-expiration cycle.
//!
//! ## Layout
//!
//! - `object`: the [`Object`]/[`Value`] model with type tagging and the
//!   integer-encoding optimization
//! - `db`: the store core (primary map + expiration index) and the generic
//!   key operations
//! - `string`, `list`, `set`: the type-specific operations on [`Db`]
//! - `expiry`: the background active-expiration cycle
//!
//! ## Expiry Model
//!
//! Keys with a deadline are expired two ways:
//! 1. **Lazy**: every store operation evicts an expired key it touches
//! 2. **Active**: the background cycle samples the expiration index and
//!    evicts what it finds, so untouched keys are reclaimed too

pub mod db;
pub mod expiry;
pub mod list;
pub mod object;
pub mod set;
pub mod string;

// Re-export commonly used types
pub use db::{Db, StoreError};
pub use expiry::{ExpiryConfig, ExpiryCycle};
pub use list::List;
pub use object::{Object, ObjectType, Value};
pub use string::SetFlag;

pub(crate) use object::now_ms;

//! Command Registry
//!
//! A static table mapping each upper-cased command name to its descriptor:
//! the handler, the arity contract, and the read/write/no-wait
//! classification.
//!
//! ## Arity Contract
//!
//! A positive arity is an exact argument count; a non-positive arity is a
//! minimum count expressed as its negation (`-2` = at least two arguments).
//!
//! ## Classification
//!
//! `NO_WAIT` commands touch only per-connection session state and execute
//! on the connection's own task, skipping the dispatcher queue. Everything
//! else runs inside its database's serialized dispatcher turn. The `WRITE`
//! flag marks mutations; it is the hook where a durability log would attach
//! and is otherwise inert.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::commands::{handler, CommandError};
use crate::connection::Session;
use crate::protocol::{Command, Reply};
use crate::server::Server;

/// Classification bits for a command.
pub mod flags {
    /// Reads keyspace state
    pub const READ: u8 = 1 << 0;
    /// Mutates keyspace state (durability-log extension point)
    pub const WRITE: u8 = 1 << 1;
    /// Executes on the connection task, bypassing the dispatcher
    pub const NO_WAIT: u8 = 1 << 2;
}

/// A connection-state handler (no-wait commands).
pub type ConnectionFn = fn(&Server, &mut Session, &[String]) -> Result<Reply, CommandError>;

/// A store handler, executed inside the database's dispatcher turn.
pub type StoreFn = fn(&Server, usize, &[String]) -> Result<Reply, CommandError>;

/// The two handler shapes a command can have.
#[derive(Clone, Copy)]
pub enum Handler {
    /// Runs on the connection task against session state
    Connection(ConnectionFn),
    /// Runs on the database's dispatcher worker against its store
    Store(StoreFn),
}

/// One registry entry.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    /// The handler function
    pub handler: Handler,
    /// Positive = exact argument count, non-positive = negated minimum
    pub arity: i32,
    /// Classification bits
    pub flags: u8,
}

impl CommandSpec {
    /// True when the command bypasses the dispatcher queue.
    pub fn is_no_wait(&self) -> bool {
        self.flags & flags::NO_WAIT != 0
    }

    /// True when the command mutates keyspace state.
    pub fn is_write(&self) -> bool {
        self.flags & flags::WRITE != 0
    }

    /// Tests an argument count against the arity contract.
    pub fn arity_matches(&self, argc: usize) -> bool {
        if self.arity > 0 {
            argc == self.arity as usize
        } else {
            argc >= (-self.arity) as usize
        }
    }
}

/// Finds a command by its (already upper-cased) name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.get(name)
}

/// Resolves a parsed command to its registry entry, validating the arity.
pub fn check(cmd: &Command) -> Result<&'static CommandSpec, CommandError> {
    let spec = lookup(&cmd.name).ok_or_else(|| CommandError::UnknownCommand(cmd.name.clone()))?;
    if !spec.arity_matches(cmd.args.len()) {
        return Err(CommandError::wrong_arity(&cmd.name));
    }
    Ok(spec)
}

static COMMANDS: LazyLock<HashMap<&'static str, CommandSpec>> = LazyLock::new(build_table);

fn conn(handler: ConnectionFn, arity: i32, extra: u8) -> CommandSpec {
    CommandSpec {
        handler: Handler::Connection(handler),
        arity,
        flags: flags::NO_WAIT | extra,
    }
}

fn store(handler: StoreFn, arity: i32, flags: u8) -> CommandSpec {
    CommandSpec {
        handler: Handler::Store(handler),
        arity,
        flags,
    }
}

fn build_table() -> HashMap<&'static str, CommandSpec> {
    use flags::{READ, WRITE};

    let mut table = HashMap::new();

    // Connection
    table.insert("AUTH", conn(handler::cmd_auth, 1, 0));
    table.insert("ECHO", conn(handler::cmd_echo, 1, 0));
    table.insert("PING", conn(handler::cmd_ping, 0, 0));
    table.insert("SELECT", conn(handler::cmd_select, 1, 0));

    // Transactions. MULTI only flips session state; EXEC is drained by the
    // connection layer and reaches its store handler only outside MULTI.
    table.insert("MULTI", conn(handler::cmd_multi, 0, 0));
    table.insert("EXEC", store(handler::cmd_exec, 0, WRITE));

    // Generic
    table.insert("DEL", store(handler::cmd_del, -1, WRITE));
    table.insert("EXISTS", store(handler::cmd_exists, -1, READ));
    table.insert("EXPIRE", store(handler::cmd_expire, 2, WRITE));
    table.insert("EXPIREAT", store(handler::cmd_expireat, 2, WRITE));
    table.insert("KEYS", store(handler::cmd_keys, 1, READ));
    table.insert("MOVE", store(handler::cmd_move, 2, WRITE));
    table.insert("RANDOMKEY", store(handler::cmd_randomkey, 0, READ));
    table.insert("RENAME", store(handler::cmd_rename, 2, WRITE));
    table.insert("RENAMENX", store(handler::cmd_renamenx, 2, WRITE));
    table.insert("TTL", store(handler::cmd_ttl, 1, READ));
    table.insert("TYPE", store(handler::cmd_type, 1, READ));

    // Strings
    table.insert("DECR", store(handler::cmd_decr, 1, WRITE));
    table.insert("DECRBY", store(handler::cmd_decrby, 2, WRITE));
    table.insert("GET", store(handler::cmd_get, 1, READ));
    table.insert("GETSET", store(handler::cmd_getset, 2, WRITE));
    table.insert("INCR", store(handler::cmd_incr, 1, WRITE));
    table.insert("INCRBY", store(handler::cmd_incrby, 2, WRITE));
    table.insert("MGET", store(handler::cmd_mget, -1, READ));
    table.insert("MSET", store(handler::cmd_mset, -2, WRITE));
    table.insert("MSETNX", store(handler::cmd_msetnx, -2, WRITE));
    table.insert("SET", store(handler::cmd_set, -2, WRITE));
    table.insert("SETNX", store(handler::cmd_setnx, 2, WRITE));
    table.insert("SUBSTR", store(handler::cmd_substr, 3, READ));

    // Lists
    table.insert("LINDEX", store(handler::cmd_lindex, 2, READ));
    table.insert("LLEN", store(handler::cmd_llen, 1, READ));
    table.insert("LPOP", store(handler::cmd_lpop, 1, WRITE));
    table.insert("LPUSH", store(handler::cmd_lpush, 2, WRITE));
    table.insert("LRANGE", store(handler::cmd_lrange, 3, READ));
    table.insert("LREM", store(handler::cmd_lrem, 3, WRITE));
    table.insert("LSET", store(handler::cmd_lset, 3, WRITE));
    table.insert("LTRIM", store(handler::cmd_ltrim, 3, WRITE));
    table.insert("RPOP", store(handler::cmd_rpop, 1, WRITE));
    table.insert("RPOPLPUSH", store(handler::cmd_rpoplpush, 2, WRITE));
    table.insert("RPUSH", store(handler::cmd_rpush, 2, WRITE));

    // Sets
    table.insert("SADD", store(handler::cmd_sadd, -2, WRITE));
    table.insert("SCARD", store(handler::cmd_scard, 1, READ));
    table.insert("SDIFF", store(handler::cmd_sdiff, -1, READ));
    table.insert("SDIFFSTORE", store(handler::cmd_sdiffstore, -2, WRITE));
    table.insert("SINTER", store(handler::cmd_sinter, -1, READ));
    table.insert("SINTERSTORE", store(handler::cmd_sinterstore, -2, WRITE));
    table.insert("SISMEMBER", store(handler::cmd_sismember, 2, READ));
    table.insert("SMEMBERS", store(handler::cmd_smembers, 1, READ));
    table.insert("SMOVE", store(handler::cmd_smove, 3, WRITE));
    table.insert("SPOP", store(handler::cmd_spop, 1, WRITE));
    table.insert("SRANDMEMBER", store(handler::cmd_srandmember, -1, READ));
    table.insert("SREM", store(handler::cmd_srem, -2, WRITE));
    table.insert("SUNION", store(handler::cmd_sunion, -1, READ));
    table.insert("SUNIONSTORE", store(handler::cmd_sunionstore, -2, WRITE));

    // Server
    table.insert("DBSIZE", store(handler::cmd_dbsize, 0, READ));
    table.insert("FLUSHALL", store(handler::cmd_flushall, 0, WRITE));
    table.insert("FLUSHDB", store(handler::cmd_flushdb, 0, WRITE));

    table
}

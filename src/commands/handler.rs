//! Command Handlers
//!
//! One function per command, in two shapes (see the registry): connection
//! handlers run on the connection task and touch only session state; store
//! handlers run inside their database's dispatcher turn and receive the
//! database index to lock.
//!
//! Handlers return `Result<Reply, CommandError>`; the caller turns an `Err`
//! into an error reply. Arity is validated before a handler runs, so
//! positional `args[..]` access is safe within each command's contract.

use crate::commands::CommandError;
use crate::connection::Session;
use crate::glob::GlobPattern;
use crate::protocol::Reply;
use crate::server::Server;
use crate::storage::{now_ms, SetFlag, StoreError};

/// Parses an argument the command treats as a 64-bit integer.
fn parse_int(arg: &str) -> Result<i64, CommandError> {
    arg.parse::<i64>()
        .map_err(|_| CommandError::Store(StoreError::NotInteger))
}

/// An absolute millisecond deadline `ms_from_now` from now. A negative
/// offset lands in the past, which the store treats as "evict now".
fn deadline_in(ms_from_now: i64) -> u64 {
    (now_ms() as i64).saturating_add(ms_from_now).max(0) as u64
}

/// Renders an optional string as a bulk reply, nil when absent.
fn bulk_or_nil(value: Option<String>) -> Reply {
    match value {
        Some(value) => Reply::Bulk(value),
        None => Reply::Nil,
    }
}

/// Renders a member list as an array of bulks.
fn member_array(members: Vec<String>) -> Reply {
    Reply::Array(members.into_iter().map(Reply::Bulk).collect())
}

// ============================================================================
// Connection commands (no-wait)
// ============================================================================

/// AUTH password
pub fn cmd_auth(server: &Server, session: &mut Session, args: &[String]) -> Result<Reply, CommandError> {
    let required = &server.config().require_pass;
    if required.is_empty() || args[0] != *required {
        return Err(CommandError::InvalidPassword);
    }
    session.authenticated = true;
    Ok(Reply::ok())
}

/// ECHO message
pub fn cmd_echo(_: &Server, _: &mut Session, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Bulk(args[0].clone()))
}

/// PING [message]
pub fn cmd_ping(_: &Server, _: &mut Session, args: &[String]) -> Result<Reply, CommandError> {
    match args.first() {
        Some(message) => Ok(Reply::Bulk(message.clone())),
        None => Ok(Reply::simple("PONG")),
    }
}

/// SELECT index
pub fn cmd_select(server: &Server, session: &mut Session, args: &[String]) -> Result<Reply, CommandError> {
    let index: usize = args[0].parse().map_err(|_| CommandError::InvalidDbIndex)?;
    if index >= server.database_count() {
        return Err(CommandError::InvalidDbIndex);
    }
    session.db = index;
    Ok(Reply::ok())
}

/// MULTI
pub fn cmd_multi(_: &Server, session: &mut Session, _: &[String]) -> Result<Reply, CommandError> {
    session.in_multi = true;
    Ok(Reply::ok())
}

// ============================================================================
// Transactions
// ============================================================================

/// EXEC outside MULTI. The interesting case, draining a pending queue, is
/// handled by the connection layer; an EXEC that reaches the dispatcher has
/// nothing queued and replies an empty array.
pub fn cmd_exec(_: &Server, _: usize, _: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Array(Vec::new()))
}

// ============================================================================
// Generic commands
// ============================================================================

/// DEL key [key ...]
pub fn cmd_del(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(server.db(db).del(args) as i64))
}

/// EXISTS key [key ...]
pub fn cmd_exists(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(server.db(db).exists(args) as i64))
}

/// EXPIRE key seconds
pub fn cmd_expire(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let seconds = parse_int(&args[1])?;
    let at = deadline_in(seconds.saturating_mul(1000));
    Ok(Reply::from_bool(server.db(db).expire_at(&args[0], at)))
}

/// EXPIREAT key unix-seconds
pub fn cmd_expireat(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let at = parse_int(&args[1])?.saturating_mul(1000).max(0) as u64;
    Ok(Reply::from_bool(server.db(db).expire_at(&args[0], at)))
}

/// KEYS pattern
pub fn cmd_keys(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let pattern = GlobPattern::new(&args[0]);
    Ok(member_array(server.db(db).keys(&pattern)))
}

/// MOVE key db-index
pub fn cmd_move(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let target: usize = args[1].parse().map_err(|_| CommandError::InvalidDbIndex)?;
    if target >= server.database_count() {
        return Err(CommandError::InvalidDbIndex);
    }
    if target == db {
        return Ok(Reply::from_bool(false));
    }

    let (mut src, mut dst) = server.lock_pair(db, target);
    Ok(Reply::from_bool(src.move_to(&args[0], &mut dst)))
}

/// RANDOMKEY
pub fn cmd_randomkey(server: &Server, db: usize, _: &[String]) -> Result<Reply, CommandError> {
    Ok(bulk_or_nil(server.db(db).random_key()))
}

/// RENAME key newkey
pub fn cmd_rename(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    server.db(db).rename(&args[0], &args[1], false)?;
    Ok(Reply::ok())
}

/// RENAMENX key newkey
pub fn cmd_renamenx(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let renamed = server.db(db).rename(&args[0], &args[1], true)?;
    Ok(Reply::from_bool(renamed))
}

/// TTL key
pub fn cmd_ttl(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(server.db(db).ttl(&args[0])))
}

/// TYPE key
pub fn cmd_type(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::simple(server.db(db).type_of(&args[0])))
}

// ============================================================================
// String commands
// ============================================================================

/// SET key value [NX|XX] [EX seconds] [PX milliseconds]
pub fn cmd_set(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let mut flag = SetFlag::None;
    let mut expires_at = 0u64;

    let mut i = 2;
    while i < args.len() {
        match args[i].to_ascii_uppercase().as_str() {
            "NX" => flag = SetFlag::Nx,
            "XX" => flag = SetFlag::Xx,
            "EX" => {
                let seconds = option_value(args, i)?;
                expires_at = deadline_in(seconds.saturating_mul(1000));
                i += 1;
            }
            "PX" => {
                let millis = option_value(args, i)?;
                expires_at = deadline_in(millis);
                i += 1;
            }
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }

    let (written, _) = server.db(db).set(&args[0], &args[1], flag, expires_at);
    if written {
        Ok(Reply::ok())
    } else {
        Ok(Reply::Nil)
    }
}

/// The integer value following an option token like `EX`.
fn option_value(args: &[String], i: usize) -> Result<i64, CommandError> {
    let raw = args.get(i + 1).ok_or(CommandError::Syntax)?;
    raw.parse().map_err(|_| CommandError::Syntax)
}

/// SETNX key value
pub fn cmd_setnx(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let (written, _) = server.db(db).set(&args[0], &args[1], SetFlag::Nx, 0);
    if written {
        Ok(Reply::ok())
    } else {
        Ok(Reply::Nil)
    }
}

/// GETSET key value
pub fn cmd_getset(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let (_, old) = server.db(db).set(&args[0], &args[1], SetFlag::None, 0);
    Ok(bulk_or_nil(old))
}

/// GET key
pub fn cmd_get(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(bulk_or_nil(server.db(db).get(&args[0])?))
}

/// INCR key
pub fn cmd_incr(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(server.db(db).incr(&args[0], 1)?))
}

/// INCRBY key increment
pub fn cmd_incrby(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let delta = parse_int(&args[1])?;
    Ok(Reply::Integer(server.db(db).incr(&args[0], delta)?))
}

/// DECR key
pub fn cmd_decr(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(server.db(db).incr(&args[0], -1)?))
}

/// DECRBY key decrement
pub fn cmd_decrby(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let delta = parse_int(&args[1])?
        .checked_neg()
        .ok_or(CommandError::Store(StoreError::NotInteger))?;
    Ok(Reply::Integer(server.db(db).incr(&args[0], delta)?))
}

/// MGET key [key ...]
pub fn cmd_mget(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let mut store = server.db(db);
    let values = args
        .iter()
        .map(|key| match store.get(key) {
            Ok(Some(value)) => Reply::Bulk(value),
            // Missing and wrong-typed keys both read as nil
            _ => Reply::Nil,
        })
        .collect();
    Ok(Reply::Array(values))
}

/// MSET key value [key value ...]
pub fn cmd_mset(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let pairs = collect_pairs(args, "MSET")?;
    server.db(db).mset(&pairs, false);
    Ok(Reply::ok())
}

/// MSETNX key value [key value ...]
pub fn cmd_msetnx(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let pairs = collect_pairs(args, "MSETNX")?;
    Ok(Reply::from_bool(server.db(db).mset(&pairs, true)))
}

fn collect_pairs(args: &[String], name: &str) -> Result<Vec<(String, String)>, CommandError> {
    if args.len() % 2 != 0 {
        return Err(CommandError::wrong_arity(name));
    }
    Ok(args
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

/// SUBSTR key start end
pub fn cmd_substr(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let start = parse_int(&args[1])?;
    let end = parse_int(&args[2])?;
    Ok(bulk_or_nil(server.db(db).substr(&args[0], start, end)?))
}

// ============================================================================
// List commands
// ============================================================================

/// LPUSH key value
pub fn cmd_lpush(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let len = server.db(db).list_push(&args[0], &args[1], true)?;
    Ok(Reply::Integer(len as i64))
}

/// RPUSH key value
pub fn cmd_rpush(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let len = server.db(db).list_push(&args[0], &args[1], false)?;
    Ok(Reply::Integer(len as i64))
}

/// LPOP key
pub fn cmd_lpop(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(bulk_or_nil(server.db(db).list_pop(&args[0], true)?))
}

/// RPOP key
pub fn cmd_rpop(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(bulk_or_nil(server.db(db).list_pop(&args[0], false)?))
}

/// LLEN key
pub fn cmd_llen(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(server.db(db).list_len(&args[0])? as i64))
}

/// LINDEX key index
pub fn cmd_lindex(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let index = parse_int(&args[1])?;
    Ok(bulk_or_nil(server.db(db).list_index(&args[0], index)?))
}

/// LRANGE key start stop
pub fn cmd_lrange(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let start = parse_int(&args[1])?;
    let end = parse_int(&args[2])?;
    match server.db(db).list_range(&args[0], start, end)? {
        Some(values) => Ok(member_array(values)),
        None => Ok(Reply::Nil),
    }
}

/// LSET key index value
pub fn cmd_lset(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let index = parse_int(&args[1])?;
    server.db(db).list_set(&args[0], index, &args[2])?;
    Ok(Reply::ok())
}

/// LREM key count value
pub fn cmd_lrem(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let count = parse_int(&args[1])?;
    let removed = server.db(db).list_remove(&args[0], count, &args[2])?;
    Ok(Reply::Integer(removed as i64))
}

/// LTRIM key start stop
pub fn cmd_ltrim(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let start = parse_int(&args[1])?;
    let end = parse_int(&args[2])?;
    server.db(db).list_trim(&args[0], start, end)?;
    Ok(Reply::ok())
}

/// RPOPLPUSH source destination
pub fn cmd_rpoplpush(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(bulk_or_nil(server.db(db).list_rpoplpush(&args[0], &args[1])?))
}

// ============================================================================
// Set commands
// ============================================================================

/// SADD key member [member ...]
pub fn cmd_sadd(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let added = server.db(db).set_add(&args[0], &args[1..])?;
    Ok(Reply::Integer(added as i64))
}

/// SREM key member [member ...]
pub fn cmd_srem(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let removed = server.db(db).set_remove(&args[0], &args[1..])?;
    Ok(Reply::Integer(removed as i64))
}

/// SCARD key
pub fn cmd_scard(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(server.db(db).set_card(&args[0])? as i64))
}

/// SISMEMBER key member
pub fn cmd_sismember(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::from_bool(server.db(db).set_is_member(&args[0], &args[1])?))
}

/// SMEMBERS key
pub fn cmd_smembers(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(member_array(server.db(db).set_members(&args[0])?))
}

/// SMOVE source destination member
pub fn cmd_smove(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let moved = server.db(db).set_move(&args[0], &args[1], &args[2])?;
    Ok(Reply::from_bool(moved))
}

/// SPOP key
pub fn cmd_spop(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(bulk_or_nil(server.db(db).set_pop(&args[0])?))
}

/// SRANDMEMBER key [count]
///
/// The count form is accepted for compatibility but a single arbitrary
/// member is returned.
pub fn cmd_srandmember(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    Ok(bulk_or_nil(server.db(db).set_rand_member(&args[0])?))
}

/// SDIFF key [key ...]
pub fn cmd_sdiff(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let members = server.db(db).set_diff(&args[0], &args[1..], None)?;
    Ok(member_array(members))
}

/// SDIFFSTORE destination key [key ...]
pub fn cmd_sdiffstore(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let members = server.db(db).set_diff(&args[1], &args[2..], Some(&args[0]))?;
    Ok(Reply::Integer(members.len() as i64))
}

/// SINTER key [key ...]
pub fn cmd_sinter(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let members = server.db(db).set_inter(&args[0], &args[1..], None)?;
    Ok(member_array(members))
}

/// SINTERSTORE destination key [key ...]
pub fn cmd_sinterstore(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let members = server.db(db).set_inter(&args[1], &args[2..], Some(&args[0]))?;
    Ok(Reply::Integer(members.len() as i64))
}

/// SUNION key [key ...]
pub fn cmd_sunion(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let members = server.db(db).set_union(&args[0], &args[1..], None)?;
    Ok(member_array(members))
}

/// SUNIONSTORE destination key [key ...]
pub fn cmd_sunionstore(server: &Server, db: usize, args: &[String]) -> Result<Reply, CommandError> {
    let members = server.db(db).set_union(&args[1], &args[2..], Some(&args[0]))?;
    Ok(Reply::Integer(members.len() as i64))
}

// ============================================================================
// Server commands
// ============================================================================

/// DBSIZE
pub fn cmd_dbsize(server: &Server, db: usize, _: &[String]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(server.db(db).len() as i64))
}

/// FLUSHDB
pub fn cmd_flushdb(server: &Server, db: usize, _: &[String]) -> Result<Reply, CommandError> {
    server.db(db).clear();
    Ok(Reply::ok())
}

/// FLUSHALL
pub fn cmd_flushall(server: &Server, _: usize, _: &[String]) -> Result<Reply, CommandError> {
    for index in 0..server.database_count() {
        server.db(index).clear();
    }
    Ok(Reply::ok())
}

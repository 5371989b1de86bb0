//! Per-Database Dispatcher
//!
//! Every logical database has exactly one dispatcher worker, and that
//! worker is the database's sole mutator. Connections (and the expiration
//! cycle) hand work over a capacity-1 channel and wait for the reply on a
//! oneshot; the worker pulls one item at a time and executes it
//! synchronously against the store.
//!
//! ## Guarantees
//!
//! - For a single database, execution order equals arrival order at its
//!   queue.
//! - No two commands mutate the same store concurrently, so the keyspace
//!   code needs no per-key locking.
//!
//! Commands classified no-wait never reach this module; they touch only
//! connection state and run on the connection's own task.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::commands::{registry, Handler};
use crate::protocol::{Command, Reply};
use crate::server::Server;

/// One unit of work for a database's dispatcher.
#[derive(Debug)]
pub enum Work {
    /// A client command ready to execute
    Command {
        cmd: Command,
        reply: oneshot::Sender<Reply>,
    },
    /// One sampling round of the active-expiration cycle; replies with the
    /// number of keys evicted
    Sweep {
        samples: usize,
        reply: oneshot::Sender<usize>,
    },
}

/// The dispatcher worker loop for one database. Runs until every queue
/// sender is gone.
pub(crate) async fn worker(server: Arc<Server>, db_index: usize, mut queue: mpsc::Receiver<Work>) {
    while let Some(work) = queue.recv().await {
        match work {
            Work::Command { cmd, reply } => {
                trace!(db = db_index, command = %cmd.name, "Executing command");
                let response = execute(&server, db_index, &cmd);
                let _ = reply.send(response);
            }
            Work::Sweep { samples, reply } => {
                let evicted = server.db(db_index).sweep_expired(samples);
                if evicted > 0 {
                    trace!(db = db_index, evicted = evicted, "Expiration sweep");
                }
                let _ = reply.send(evicted);
            }
        }
    }
}

/// Validates and executes one command against a database. Every failure is
/// converted into an error reply; nothing here can take the connection
/// down.
pub fn execute(server: &Server, db_index: usize, cmd: &Command) -> Reply {
    let spec = match registry::check(cmd) {
        Ok(spec) => spec,
        Err(e) => return Reply::Error(e.to_string()),
    };

    let result = match spec.handler {
        Handler::Store(f) => f(server, db_index, &cmd.args),
        Handler::Connection(_) => return Reply::error("ERR command is not dispatchable"),
    };

    // WRITE-classified commands (spec.is_write()) are where a durability
    // log would append; nothing is persisted today.

    match result {
        Ok(reply) => reply,
        Err(e) => Reply::Error(e.to_string()),
    }
}

/// Hands a command to a database's dispatcher and waits for the reply.
/// The send blocks while the worker is mid-execution, which is the
/// ordering handoff the concurrency model relies on.
pub async fn submit(server: &Server, db_index: usize, cmd: Command) -> Reply {
    let (tx, rx) = oneshot::channel();
    let work = Work::Command { cmd, reply: tx };
    if server.queue(db_index).send(work).await.is_err() {
        return Reply::error("ERR database worker unavailable");
    }
    match rx.await {
        Ok(reply) => reply,
        Err(_) => Reply::error("ERR database worker unavailable"),
    }
}

/// Submits one expiration sampling round through the dispatcher, returning
/// the evicted count, or None when the worker is gone.
pub async fn sweep(server: &Server, db_index: usize, samples: usize) -> Option<usize> {
    let (tx, rx) = oneshot::channel();
    let work = Work::Sweep {
        samples,
        reply: tx,
    };
    if server.queue(db_index).send(work).await.is_err() {
        return None;
    }
    rx.await.ok()
}

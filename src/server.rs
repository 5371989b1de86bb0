//! Server State and Accept Loop
//!
//! The [`Server`] owns the logical databases and the handoff queues feeding
//! their dispatcher workers. Connections, dispatcher workers, and the
//! expiration cycle all share one `Arc<Server>`.
//!
//! ## Ownership of the stores
//!
//! Each database's [`Db`] sits behind a `std::sync::Mutex`, but the mutex is
//! not how commands are serialized: the per-database dispatcher worker is
//! the only routine path that locks a store, and it executes one command at
//! a time (see the `dispatch` module). The mutex exists for the two
//! deliberate cross-database exceptions, MOVE (which locks the source and
//! destination pair in index order) and FLUSHALL (which locks one store at
//! a time). No lock is ever held across an await point.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::connection::handle_connection;
use crate::dispatch::{self, Work};
use crate::storage::Db;

/// Capacity of each database's handoff queue. One slot gives rendezvous
/// behavior: a sender blocks until the dispatcher is ready to take the
/// next command.
const QUEUE_DEPTH: usize = 1;

/// Resolved startup parameters. The CLI layer fills this in; everything
/// here is a final value, never re-parsed.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Number of logical databases
    pub databases: usize,
    /// Expiration cycle frequency: one tick every `1000/hz` milliseconds
    pub hz: u32,
    /// Keys sampled from the expiration index per cycle round
    pub active_expire_samples: usize,
    /// Required password; empty disables authentication
    pub require_pass: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            databases: 16,
            hz: 10,
            active_expire_samples: 20,
            require_pass: String::new(),
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared server state: configuration, stores, and dispatcher queues.
pub struct Server {
    config: ServerConfig,
    dbs: Vec<Mutex<Db>>,
    queues: Vec<mpsc::Sender<Work>>,
}

impl Server {
    /// Builds the server state and spawns one dispatcher worker per
    /// logical database. Must be called from within a tokio runtime.
    pub fn start(config: ServerConfig) -> Arc<Server> {
        let databases = config.databases.max(1);

        let mut queues = Vec::with_capacity(databases);
        let mut receivers = Vec::with_capacity(databases);
        for _ in 0..databases {
            let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
            queues.push(tx);
            receivers.push(rx);
        }

        let server = Arc::new(Server {
            config,
            dbs: (0..databases).map(|_| Mutex::new(Db::new())).collect(),
            queues,
        });

        for (db_index, rx) in receivers.into_iter().enumerate() {
            tokio::spawn(dispatch::worker(Arc::clone(&server), db_index, rx));
        }
        info!(databases = databases, "Dispatcher workers started");

        server
    }

    /// The resolved startup configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of logical databases.
    pub fn database_count(&self) -> usize {
        self.dbs.len()
    }

    /// Locks one database store. Callers run inside that database's
    /// dispatcher turn, so the lock is uncontended in the routine case.
    pub fn db(&self, index: usize) -> MutexGuard<'_, Db> {
        self.dbs[index].lock().unwrap()
    }

    /// Locks two distinct stores for a cross-database operation. Locks are
    /// always acquired in index order, whatever order the caller names
    /// them, so concurrent cross-database operations cannot deadlock.
    pub fn lock_pair(&self, src: usize, dst: usize) -> (MutexGuard<'_, Db>, MutexGuard<'_, Db>) {
        assert_ne!(src, dst, "lock_pair requires two distinct databases");
        if src < dst {
            let first = self.dbs[src].lock().unwrap();
            let second = self.dbs[dst].lock().unwrap();
            (first, second)
        } else {
            let second = self.dbs[dst].lock().unwrap();
            let first = self.dbs[src].lock().unwrap();
            (first, second)
        }
    }

    /// The handoff queue feeding one database's dispatcher.
    pub(crate) fn queue(&self, index: usize) -> &mpsc::Sender<Work> {
        &self.queues[index]
    }

    /// Accepts connections until the shutdown future resolves. Each
    /// accepted client runs on its own task.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send,
    ) -> std::io::Result<()> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                handle_connection(stream, addr, server).await;
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping accept loop");
                    return Ok(());
                }
            }
        }
    }
}

//! Active-Expiration Cycle
//!
//! Lazy expiry (eviction on access) cannot reclaim keys nobody touches, so
//! a background cycle proactively samples keys carrying a deadline and
//! evicts the expired ones.
//!
//! ## How a Tick Works
//!
//! Every `1000/hz` milliseconds the cycle walks the databases in order. For
//! each database it submits one sampling round (`samples` keys drawn from
//! the expiration index) through that database's dispatcher queue, exactly
//! like a client command, so it never mutates a store outside the
//! serialization domain. When the round evicts more than a quarter of its
//! sample the same database is swept again immediately; high eviction
//! density means there is more garbage where that came from.
//!
//! The whole tick is bounded by a time budget of 25% of the period.
//! The budget is checked between rounds, never mid-round; databases left
//! unvisited when it runs out simply wait for the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::dispatch;
use crate::server::Server;

/// Fraction of a sampling round that must be expired to trigger an
/// immediate repeat on the same database.
const REPEAT_RATIO: f64 = 0.25;

/// Configuration for the expiration cycle, resolved from the server
/// configuration.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Ticks per second
    pub hz: u32,
    /// Keys sampled from the expiration index per round
    pub samples: usize,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            hz: 10,
            samples: 20,
        }
    }
}

impl ExpiryConfig {
    /// The tick period, `1000/hz` milliseconds.
    pub fn period(&self) -> Duration {
        Duration::from_millis((1000 / self.hz.max(1)).max(1) as u64)
    }

    /// The per-tick work budget: 25% of the period.
    pub fn budget(&self) -> Duration {
        self.period() / 4
    }
}

/// A handle to the running expiration cycle.
///
/// Dropping the handle stops the background task.
#[derive(Debug)]
pub struct ExpiryCycle {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpiryCycle {
    /// Starts the cycle for a server, deriving its settings from the
    /// server configuration.
    pub fn start(server: Arc<Server>) -> Self {
        let config = ExpiryConfig {
            hz: server.config().hz,
            samples: server.config().active_expire_samples,
        };
        Self::start_with(server, config)
    }

    /// Starts the cycle with explicit settings.
    pub fn start_with(server: Arc<Server>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(cycle_loop(server, config, shutdown_rx));
        info!("Active-expiration cycle started");
        Self { shutdown_tx }
    }

    /// Stops the cycle. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        debug!("Active-expiration cycle stopped");
    }
}

impl Drop for ExpiryCycle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn cycle_loop(server: Arc<Server>, config: ExpiryConfig, mut shutdown_rx: watch::Receiver<bool>) {
    let period = config.period();
    let mut ticker = tokio::time::interval(period);
    // The first tick fires immediately; skip it so ticks stay on period
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
                continue;
            }
        }

        let deadline = Instant::now() + config.budget();

        'databases: for db_index in 0..server.database_count() {
            loop {
                if Instant::now() >= deadline {
                    trace!(db = db_index, "Tick budget exhausted, deferring remaining databases");
                    break 'databases;
                }

                let Some(evicted) = dispatch::sweep(&server, db_index, config.samples).await else {
                    // Dispatcher gone: the server is shutting down
                    return;
                };

                let ratio = evicted as f64 / config.samples.max(1) as f64;
                if ratio <= REPEAT_RATIO {
                    break;
                }
                debug!(
                    db = db_index,
                    evicted = evicted,
                    "High eviction density, sweeping the same database again"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, Reply};
    use crate::server::ServerConfig;
    use crate::storage::now_ms;

    fn cmd(name: &str, args: &[&str]) -> Command {
        Command {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_period_and_budget() {
        let config = ExpiryConfig {
            hz: 10,
            samples: 20,
        };
        assert_eq!(config.period(), Duration::from_millis(100));
        assert_eq!(config.budget(), Duration::from_millis(25));

        // hz of zero must not divide by zero
        let config = ExpiryConfig { hz: 0, samples: 20 };
        assert_eq!(config.period(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_cycle_evicts_untouched_keys() {
        let server = Server::start(ServerConfig {
            databases: 2,
            ..Default::default()
        });

        // Keys that expire almost immediately, in two databases
        for db_index in 0..2 {
            let mut db = server.db(db_index);
            for i in 0..10 {
                db.set(&format!("dead:{}", i), "v", crate::storage::SetFlag::None, now_ms() + 20);
            }
            db.set("forever", "v", crate::storage::SetFlag::None, 0);
        }

        let _cycle = ExpiryCycle::start_with(
            Arc::clone(&server),
            ExpiryConfig {
                hz: 50,
                samples: 20,
            },
        );

        tokio::time::sleep(Duration::from_millis(300)).await;

        // The cycle reclaimed the expired keys without any client access
        for db_index in 0..2 {
            assert_eq!(server.db(db_index).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_cycle_runs_through_dispatcher() {
        let server = Server::start(ServerConfig::default());
        let _cycle = ExpiryCycle::start_with(
            Arc::clone(&server),
            ExpiryConfig {
                hz: 50,
                samples: 20,
            },
        );

        // Client traffic keeps flowing while the cycle shares the queue
        for i in 0..50 {
            let reply =
                dispatch::submit(&server, 0, cmd("SET", &[&format!("k{}", i), "v"])).await;
            assert_eq!(reply, Reply::ok());
        }
        assert_eq!(
            dispatch::submit(&server, 0, cmd("DBSIZE", &[])).await,
            Reply::Integer(50)
        );
    }

    #[tokio::test]
    async fn test_cycle_stops_on_drop() {
        let server = Server::start(ServerConfig::default());

        {
            let _cycle = ExpiryCycle::start_with(
                Arc::clone(&server),
                ExpiryConfig {
                    hz: 50,
                    samples: 20,
                },
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Keys expiring after the cycle stopped stay until lazily evicted
        server
            .db(0)
            .set("dead", "v", crate::storage::SetFlag::None, now_ms() + 10);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.db(0).len(), 1);

        // Lazy expiry still reclaims it on access
        assert_eq!(server.db(0).get("dead").unwrap(), None);
        assert_eq!(server.db(0).len(), 0);
    }
}

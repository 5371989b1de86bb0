//! emberkv server entry point.
//!
//! Parses command-line flags into the resolved [`ServerConfig`], wires up
//! logging, and runs the accept loop until ctrl-c.

use std::sync::Arc;

use emberkv::server::{Server, ServerConfig};
use emberkv::storage::ExpiryCycle;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Parse configuration from command-line arguments.
fn config_from_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                config.host = take_value(&args, i);
                i += 2;
            }
            "--port" | "-p" => {
                config.port = parse_value(&args, i);
                i += 2;
            }
            "--databases" => {
                config.databases = parse_value(&args, i);
                i += 2;
            }
            "--hz" => {
                config.hz = parse_value(&args, i);
                i += 2;
            }
            "--expire-samples" => {
                config.active_expire_samples = parse_value(&args, i);
                i += 2;
            }
            "--requirepass" => {
                config.require_pass = take_value(&args, i);
                i += 2;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("emberkv version {}", emberkv::VERSION);
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

fn take_value(args: &[String], i: usize) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", args[i]);
            std::process::exit(1);
        }
    }
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize) -> T {
    take_value(args, i).parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}", args[i]);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
emberkv - An In-Memory, Multi-Database Key-Value Server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>          Port to listen on (default: 6379)
        --databases <N>        Number of logical databases (default: 16)
        --hz <HZ>              Expiration cycle frequency (default: 10)
        --expire-samples <N>   Keys sampled per expiration round (default: 20)
        --requirepass <PASS>   Require AUTH with this password
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    emberkv                          # Start on 127.0.0.1:6379
    emberkv --port 6380              # Start on port 6380
    emberkv --requirepass hunter2    # Require authentication

CONNECTING:
    Use redis-cli or any Redis client to connect:
    $ redis-cli -p 6379
    127.0.0.1:6379> PING
    PONG
    127.0.0.1:6379> SET name "Ariz"
    OK
"#
    );
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
emberkv v{} - In-Memory Multi-Database Key-Value Server
───────────────────────────────────────────────────────
Server started on {} ({} databases)
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        emberkv::VERSION,
        config.bind_address(),
        config.databases,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    let bind_address = config.bind_address();
    let server = Server::start(config);
    info!(
        databases = server.database_count(),
        "Keyspace stores initialized"
    );

    let _cycle = ExpiryCycle::start(Arc::clone(&server));

    let listener = TcpListener::bind(&bind_address).await?;
    info!("Listening on {}", bind_address);

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping server...");
    };

    server.serve(listener, shutdown).await?;

    info!("Server shutdown complete");
    Ok(())
}

//! Connection Handler
//!
//! The per-connection loop: accumulate bytes in a buffer, parse one request
//! at a time, route it, write the reply. TCP is a stream, so a single read
//! may carry a partial request or several pipelined ones; the buffer plus
//! the incremental parser handles both.
//!
//! ## Routing
//!
//! ```text
//! parsed command
//!      │
//!      ├── QUIT ──────────────> +OK, close
//!      ├── auth gate ─────────> error reply when unauthenticated
//!      ├── MULTI queueing ────> +QUEUED (everything but EXEC)
//!      ├── EXEC ──────────────> drain queue, array reply
//!      ├── no-wait ───────────> run here against the session
//!      └── store command ─────> dispatcher queue, await reply
//! ```
//!
//! A protocol format error is connection-fatal: framing is gone, so the
//! loop ends and only this client is affected.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::commands::{registry, CommandError, Handler};
use crate::connection::Session;
use crate::dispatch;
use crate::protocol::{parse_request, Command, FrameError, Reply, Request};
use crate::server::Server;

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable protocol format error
    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),

    /// Client disconnected normally
    #[error("client disconnected")]
    ClientDisconnected,

    /// Stream ended in the middle of a request
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("buffer size limit exceeded")]
    BufferFull,
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Shared server state
    server: Arc<Server>,

    /// This connection's session state
    session: Session,
}

impl ConnectionHandler {
    /// Creates a handler for an accepted stream.
    pub fn new(stream: TcpStream, addr: SocketAddr, server: Arc<Server>) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            server,
            session: Session::new(),
        }
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::Io(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        result
    }

    /// The read-parse-route-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(request) = self.try_parse_request()? {
                // A negative-count frame carries no command
                let Request::Command(cmd) = request else {
                    continue;
                };

                if cmd.name == "QUIT" {
                    self.send_reply(&Reply::ok()).await?;
                    return Ok(());
                }

                let reply = self.process(cmd).await;
                self.send_reply(&reply).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Runs one command through the gate/queue/route pipeline.
    async fn process(&mut self, cmd: Command) -> Reply {
        if let Err(e) = self.check_auth(&cmd) {
            return Reply::Error(e.to_string());
        }

        if self.session.in_multi {
            if cmd.name == "EXEC" {
                return self.exec_pending().await;
            }
            self.session.pending.push(cmd);
            return Reply::simple("QUEUED");
        }

        self.route(cmd).await
    }

    /// Executes the transaction queue: each pending command goes through
    /// its normal path, one at a time, and the replies come back as one
    /// array. Commands from other connections may interleave between the
    /// queued commands at the dispatcher.
    async fn exec_pending(&mut self) -> Reply {
        let pending = std::mem::take(&mut self.session.pending);
        self.session.in_multi = false;

        let mut replies = Vec::with_capacity(pending.len());
        for cmd in pending {
            replies.push(self.route(cmd).await);
        }
        Reply::Array(replies)
    }

    /// Routes a validated command: no-wait commands run inline against the
    /// session, everything else is handed to the selected database's
    /// dispatcher.
    async fn route(&mut self, cmd: Command) -> Reply {
        let spec = match registry::lookup(&cmd.name) {
            Some(spec) => spec,
            None => return Reply::Error(CommandError::UnknownCommand(cmd.name.clone()).to_string()),
        };

        if spec.is_no_wait() {
            if !spec.arity_matches(cmd.args.len()) {
                return Reply::Error(CommandError::wrong_arity(&cmd.name).to_string());
            }
            return match spec.handler {
                Handler::Connection(f) => match f(&self.server, &mut self.session, &cmd.args) {
                    Ok(reply) => reply,
                    Err(e) => Reply::Error(e.to_string()),
                },
                // The registry never marks store handlers no-wait
                Handler::Store(_) => Reply::error("ERR command is not dispatchable"),
            };
        }

        dispatch::submit(&self.server, self.session.db, cmd).await
    }

    /// When a password is required, everything except AUTH is refused
    /// until the session authenticates.
    fn check_auth(&self, cmd: &Command) -> Result<(), CommandError> {
        if self.server.config().require_pass.is_empty()
            || self.session.authenticated
            || cmd.name == "AUTH"
        {
            Ok(())
        } else {
            Err(CommandError::NotPermitted)
        }
    }

    /// Attempts to parse one request from the buffer.
    fn try_parse_request(&mut self) -> Result<Option<Request>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match parse_request(&self.buffer) {
            Ok(Some((request, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                Ok(Some(request))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Protocol format error");
                Err(ConnectionError::Frame(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            }
            return Err(ConnectionError::UnexpectedEof);
        }

        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    /// Serializes and writes one reply.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(client = %self.addr, bytes = bytes.len(), "Sent reply");
        Ok(())
    }
}

/// Runs a connection to completion, swallowing the routine endings.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, server: Arc<Server>) {
    let handler = ConnectionHandler::new(stream, addr, server);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpListener;

    async fn spawn_server(config: ServerConfig) -> SocketAddr {
        let server = Server::start(config);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            server
                .serve(listener, std::future::pending())
                .await
                .unwrap();
        });
        addr
    }

    async fn connect(addr: SocketAddr) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        (BufReader::new(read_half), write_half)
    }

    async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_ping_and_echo() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+PONG\r\n");

        writer
            .write_all(b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "$5\r\n");
        assert_eq!(read_line(&mut reader).await, "hello\r\n");
    }

    #[tokio::test]
    async fn test_inline_command() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"ping\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+PONG\r\n");
    }

    #[tokio::test]
    async fn test_set_get_through_dispatcher() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "+OK\r\n");

        writer
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "$4\r\n");
        assert_eq!(read_line(&mut reader).await, "Ariz\r\n");

        writer
            .write_all(b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "$-1\r\n");
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer
            .write_all(
                b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\n1\r\n*2\r\n$4\r\nINCR\r\n$1\r\nk\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n",
            )
            .await
            .unwrap();

        assert_eq!(read_line(&mut reader).await, "+OK\r\n");
        assert_eq!(read_line(&mut reader).await, ":2\r\n");
        assert_eq!(read_line(&mut reader).await, "$1\r\n");
        assert_eq!(read_line(&mut reader).await, "2\r\n");
    }

    #[tokio::test]
    async fn test_error_reply_keeps_connection() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer
            .write_all(b"*2\r\n$6\r\nNOSUCH\r\n$1\r\nx\r\n")
            .await
            .unwrap();
        assert_eq!(
            read_line(&mut reader).await,
            "-ERR unknown command 'NOSUCH'\r\n"
        );

        writer.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+PONG\r\n");
    }

    #[tokio::test]
    async fn test_multi_exec_ordering() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"*1\r\n$5\r\nMULTI\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+OK\r\n");

        writer
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\n1\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "+QUEUED\r\n");

        writer.write_all(b"*2\r\n$4\r\nINCR\r\n$1\r\nk\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+QUEUED\r\n");

        writer.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+QUEUED\r\n");

        writer.write_all(b"*1\r\n$4\r\nEXEC\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "*3\r\n");
        assert_eq!(read_line(&mut reader).await, "+OK\r\n");
        assert_eq!(read_line(&mut reader).await, ":2\r\n");
        assert_eq!(read_line(&mut reader).await, "$1\r\n");
        assert_eq!(read_line(&mut reader).await, "2\r\n");

        // The transaction flag is cleared: commands execute directly again
        writer.write_all(b"*2\r\n$4\r\nINCR\r\n$1\r\nk\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, ":3\r\n");
    }

    #[tokio::test]
    async fn test_exec_without_multi() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"*1\r\n$4\r\nEXEC\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "*0\r\n");
    }

    #[tokio::test]
    async fn test_auth_gate() {
        let addr = spawn_server(ServerConfig {
            require_pass: "sekrit".to_string(),
            ..Default::default()
        })
        .await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        assert_eq!(
            read_line(&mut reader).await,
            "-ERR operation not permitted\r\n"
        );

        writer
            .write_all(b"*2\r\n$4\r\nAUTH\r\n$5\r\nwrong\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "-ERR invalid password\r\n");

        writer
            .write_all(b"*2\r\n$4\r\nAUTH\r\n$6\r\nsekrit\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "+OK\r\n");

        writer.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "$-1\r\n");
    }

    #[tokio::test]
    async fn test_select_isolates_databases() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "+OK\r\n");

        writer.write_all(b"*2\r\n$6\r\nSELECT\r\n$1\r\n1\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+OK\r\n");

        writer.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "$-1\r\n");

        writer.write_all(b"*2\r\n$6\r\nSELECT\r\n$1\r\n0\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+OK\r\n");

        writer.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "$1\r\n");
        assert_eq!(read_line(&mut reader).await, "v\r\n");
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_only_this_connection() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        // Negative bulk length other than -1: connection-fatal
        writer.write_all(b"*1\r\n$-5\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "");

        // A fresh connection parses fine
        let (mut reader, mut writer) = connect(addr).await;
        writer.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+PONG\r\n");
    }

    #[tokio::test]
    async fn test_quit() {
        let addr = spawn_server(ServerConfig::default()).await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"*1\r\n$4\r\nQUIT\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "+OK\r\n");
        // Server closes its side after QUIT
        assert_eq!(read_line(&mut reader).await, "");
    }
}

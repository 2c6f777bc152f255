//! TCP client for the telemetry stream
//!
//! The connection runs on its own tokio task and hands everything it produces
//! (status changes and completed blocks) to the consumer over one ordered
//! channel, so the model is only ever mutated from the consumer side.

use crate::block::{Block, BlockAssembler};
use crate::framer::StreamFramer;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 26600;
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

const SHUTDOWN_REQUESTED: &str = "shutdown requested";
const CONSUMER_GONE: &str = "consumer went away";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    /// Size of each socket read.
    pub chunk_size: usize,
    pub connect_timeout: Option<Duration>,
    /// Maximum silence between reads before the connection is closed.
    pub read_timeout: Option<Duration>,
}

impl ConnectionOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: None,
            read_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl Phase {
    /// `Failed` and `Closed` end the connection; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Failed | Phase::Closed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Connecting => "connecting",
            Phase::Connected => "connected",
            Phase::Failed => "failed",
            Phase::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub phase: Phase,
    pub detail: String,
}

impl ConnectionStatus {
    pub fn new(phase: Phase, detail: impl Into<String>) -> Self {
        Self {
            phase,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.phase)
        } else {
            write!(f, "{}: {}", self.phase, self.detail)
        }
    }
}

/// Everything the I/O task hands to the consumer, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Status(ConnectionStatus),
    Block(Block),
}

pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

pub struct ConnectionManager {
    options: ConnectionOptions,
}

impl ConnectionManager {
    pub fn new(options: ConnectionOptions) -> Self {
        Self { options }
    }

    /// Starts a connection to `host:port` with default options.
    pub fn connect(host: impl Into<String>, port: u16) -> (ConnectionHandle, EventReceiver) {
        Self::new(ConnectionOptions::new(host, port)).start()
    }

    /// Spawns the I/O task. Must be called from within a tokio runtime.
    ///
    /// The receiver yields `Connecting` first and a terminal status
    /// (`Failed` or `Closed`) last, after which it is closed.
    pub fn start(self) -> (ConnectionHandle, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Shutdown::new());
        let task = tokio::spawn(run(self.options, Arc::clone(&shutdown), tx));
        (ConnectionHandle { shutdown, task }, rx)
    }
}

struct Shutdown {
    keep_going: AtomicBool,
    wake: Notify,
}

impl Shutdown {
    fn new() -> Self {
        Self {
            keep_going: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }

    fn keep_going(&self) -> bool {
        self.keep_going.load(Ordering::SeqCst)
    }

    fn request(&self) {
        self.keep_going.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so a request made between reads is not lost.
        self.wake.notify_one();
    }
}

pub struct ConnectionHandle {
    shutdown: Arc<Shutdown>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Asks the I/O task to stop. A pending connect or read is abandoned and
    /// the socket dropped, so this never waits on the remote.
    pub fn request_shutdown(&self) {
        self.shutdown.request();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the I/O task to emit its terminal status and exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Connection task ended abnormally: {}", e);
        }
    }
}

struct Emitter {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl Emitter {
    fn status(&self, phase: Phase, detail: impl Into<String>) {
        let status = ConnectionStatus::new(phase, detail);
        debug!("Connection {}", status);
        let _ = self.tx.send(ClientEvent::Status(status));
    }

    fn block(&self, block: Block) -> bool {
        self.tx.send(ClientEvent::Block(block)).is_ok()
    }
}

async fn run(options: ConnectionOptions, shutdown: Arc<Shutdown>, tx: mpsc::UnboundedSender<ClientEvent>) {
    let emit = Emitter { tx };
    let address = options.address();
    emit.status(Phase::Connecting, address.clone());

    if !shutdown.keep_going() {
        emit.status(Phase::Closed, SHUTDOWN_REQUESTED);
        return;
    }

    let opened = tokio::select! {
        _ = shutdown.wake.notified() => None,
        _ = emit.tx.closed() => None,
        opened = open(&options) => Some(opened),
    };
    let stream = match opened {
        Some(Ok(stream)) if shutdown.keep_going() => stream,
        Some(Err(e)) => {
            emit.status(Phase::Failed, e.to_string());
            return;
        }
        // Shutdown won the race or the consumer is gone; never report Connected.
        Some(Ok(_)) | None => {
            let reason = if emit.tx.is_closed() {
                CONSUMER_GONE
            } else {
                SHUTDOWN_REQUESTED
            };
            emit.status(Phase::Closed, reason);
            return;
        }
    };
    emit.status(Phase::Connected, address);

    let reason = read_loop(stream, &options, &shutdown, &emit).await;
    emit.status(Phase::Closed, reason);
}

async fn open(options: &ConnectionOptions) -> io::Result<TcpStream> {
    let connect = TcpStream::connect((options.host.as_str(), options.port));
    match options.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?,
        None => connect.await,
    }
}

async fn read_chunk(stream: &mut TcpStream, buf: &mut [u8], limit: Option<Duration>) -> io::Result<usize> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, stream.read(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))?,
        None => stream.read(buf).await,
    }
}

/// Reads until shutdown, EOF, error or a dropped receiver (noticed even while
/// a read is pending); returns why it stopped. The stream is dropped on return.
async fn read_loop(
    mut stream: TcpStream,
    options: &ConnectionOptions,
    shutdown: &Shutdown,
    emit: &Emitter,
) -> String {
    let mut framer = StreamFramer::new();
    let mut assembler = BlockAssembler::new();
    let mut buf = vec![0u8; options.chunk_size.max(1)];

    loop {
        if !shutdown.keep_going() {
            return SHUTDOWN_REQUESTED.to_string();
        }

        let read = tokio::select! {
            _ = shutdown.wake.notified() => continue,
            _ = emit.tx.closed() => return CONSUMER_GONE.to_string(),
            read = read_chunk(&mut stream, &mut buf, options.read_timeout) => read,
        };

        let n = match read {
            Ok(0) => return "remote closed the connection".to_string(),
            Ok(n) => n,
            Err(e) => return e.to_string(),
        };

        for line in framer.feed(&buf[..n]) {
            if let Some(block) = assembler.push_line(&line) {
                debug!("Block complete with {} events", block.len());
                if !emit.block(block) {
                    return CONSUMER_GONE.to_string();
                }
            }
        }
    }
}

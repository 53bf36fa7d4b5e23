// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::Point;
use crate::error::ClientError;

/// Callback receiving delivery errors, which happen off the caller's timeline.
pub type ErrorListener = Arc<dyn Fn(&ClientError) + Send + Sync>;

const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Clone)]
pub struct ClientConfig {
    /// `host:port`, `tcp://host:port` or `udp://host:port`
    pub endpoint: String,
    /// Longest time a point waits in the buffer before being written.
    pub batch_timeout: Duration,
    /// Buffered points that trigger an immediate write.
    pub batch_size: usize,
    /// Points that can wait for the sender before new ones are dropped.
    pub queue_capacity: usize,
    pub error_listener: Option<ErrorListener>,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            error_listener: None,
        }
    }

    pub fn with_error_listener(
        mut self,
        listener: impl Fn(&ClientError) + Send + Sync + 'static,
    ) -> Self {
        self.error_listener = Some(Arc::new(listener));
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("batch_timeout", &self.batch_timeout)
            .field("batch_size", &self.batch_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("error_listener", &self.error_listener.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Udp(String),
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        let invalid = |reason| ClientError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason,
        };

        let (scheme, address) = raw.split_once("://").unwrap_or(("tcp", raw));
        let address = address.trim_end_matches('/');
        let (host, port) = address.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        match scheme {
            "tcp" => Ok(Endpoint::Tcp(address.to_string())),
            "udp" => Ok(Endpoint::Udp(address.to_string())),
            _ => Err(invalid("unsupported scheme, expected tcp or udp")),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(address) => write!(f, "tcp://{address}"),
            Endpoint::Udp(address) => write!(f, "udp://{address}"),
        }
    }
}

/// Handle to a background sender that batches points and writes them to one
/// endpoint. Cloning shares the sender; it stops after the last handle is
/// dropped and the remaining points are written.
#[derive(Clone)]
pub struct LineProtocolClient {
    queue: mpsc::Sender<Point>,
    flush: Arc<Notify>,
    error_listener: Option<ErrorListener>,
}

impl LineProtocolClient {
    /// Validates the endpoint and spawns the sender task. Must be called from
    /// within a tokio runtime. No connection is made until the first write.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let endpoint = Endpoint::parse(&config.endpoint)?;
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let flush = Arc::new(Notify::new());

        info!(
            endpoint = %endpoint,
            batch_timeout_ms = config.batch_timeout.as_millis() as u64,
            batch_size = config.batch_size,
            "Starting line protocol sender"
        );

        let sender = Sender {
            endpoint,
            queue: receiver,
            flush: Arc::clone(&flush),
            batch_timeout: config.batch_timeout.max(Duration::from_millis(1)),
            batch_size: config.batch_size.max(1),
            buffer: String::new(),
            pending: 0,
            connection: None,
            error_listener: config.error_listener.clone(),
        };
        tokio::spawn(sender.run());

        Ok(Self {
            queue,
            flush,
            error_listener: config.error_listener,
        })
    }

    /// Queues a point without waiting. A full queue drops the point and
    /// reports [`ClientError::QueueFull`].
    pub fn send(&self, point: Point) {
        match self.queue.try_send(point) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => notify(&self.error_listener, &ClientError::QueueFull),
            Err(TrySendError::Closed(_)) => notify(&self.error_listener, &ClientError::Closed),
        }
    }

    /// Asks the sender to write everything queued so far. Does not wait for
    /// the write; failures go to the error listener.
    pub fn flush(&self) -> Result<(), ClientError> {
        if self.queue.is_closed() {
            return Err(ClientError::Closed);
        }
        self.flush.notify_one();
        Ok(())
    }
}

fn notify(listener: &Option<ErrorListener>, error: &ClientError) {
    match listener {
        Some(listener) => listener(error),
        None => warn!(error = %error, "Line protocol client error"),
    }
}

enum Wake {
    Point(Option<Point>),
    Flush,
    Tick,
}

struct Sender {
    endpoint: Endpoint,
    queue: mpsc::Receiver<Point>,
    flush: Arc<Notify>,
    batch_timeout: Duration,
    batch_size: usize,
    buffer: String,
    pending: usize,
    connection: Option<Connection>,
    error_listener: Option<ErrorListener>,
}

impl Sender {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.batch_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            let wake = tokio::select! {
                point = self.queue.recv() => Wake::Point(point),
                _ = self.flush.notified() => Wake::Flush,
                _ = ticker.tick() => Wake::Tick,
            };

            match wake {
                Wake::Point(Some(point)) => {
                    self.buffer_point(point);
                    if self.pending >= self.batch_size {
                        self.write().await;
                    }
                }
                Wake::Point(None) => {
                    self.write().await;
                    debug!(endpoint = %self.endpoint, "Line protocol sender stopped");
                    return;
                }
                Wake::Flush => {
                    while let Ok(point) = self.queue.try_recv() {
                        self.buffer_point(point);
                    }
                    self.write().await;
                }
                Wake::Tick => self.write().await,
            }
        }
    }

    fn buffer_point(&mut self, point: Point) {
        match point.encode(&mut self.buffer) {
            Ok(()) => self.pending += 1,
            Err(e) => notify(&self.error_listener, &e),
        }
    }

    async fn write(&mut self) {
        if self.pending == 0 {
            return;
        }
        let points = std::mem::take(&mut self.pending);
        let mut payload = std::mem::take(&mut self.buffer);

        match self.deliver(&payload, points).await {
            Ok(()) => debug!(endpoint = %self.endpoint, points, "Sent points"),
            Err(e) => notify(&self.error_listener, &e),
        }

        payload.clear();
        self.buffer = payload;
    }

    /// Writes one payload, reconnecting first if the previous write failed.
    async fn deliver(&mut self, payload: &str, points: usize) -> Result<(), ClientError> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => within(self.batch_timeout, Connection::open(&self.endpoint))
                .await
                .map_err(|source| ClientError::Connect {
                    endpoint: self.endpoint.to_string(),
                    source,
                })?,
        };

        within(self.batch_timeout, connection.send(payload))
            .await
            .map_err(|source| ClientError::Send {
                endpoint: self.endpoint.to_string(),
                points,
                source,
            })?;

        self.connection = Some(connection);
        Ok(())
    }
}

/// Bounds a connection operation so a stalled peer cannot hold up the sender.
async fn within<T>(
    limit: Duration,
    operation: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    tokio::time::timeout(limit, operation)
        .await
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "operation timed out")))
}

enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Connection {
    async fn open(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(address) => TcpStream::connect(address.as_str())
                .await
                .map(Connection::Tcp),
            Endpoint::Udp(address) => {
                let remote = tokio::net::lookup_host(address.as_str())
                    .await?
                    .next()
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::NotFound, "endpoint resolved to no address")
                    })?;
                let local: SocketAddr = match remote {
                    SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
                    SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
                };
                let socket = UdpSocket::bind(local).await?;
                socket.connect(remote).await?;
                Ok(Connection::Udp(socket))
            }
        }
    }

    async fn send(&mut self, payload: &str) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => {
                stream.write_all(payload.as_bytes()).await?;
                stream.flush().await
            }
            Connection::Udp(socket) => {
                // one datagram per line keeps each under the MTU
                for line in payload.split_inclusive('\n') {
                    socket.send(line.as_bytes()).await?;
                }
                Ok(())
            }
        }
    }
}

//! Connection management.

use crate::error::ClientError;
use rcond_protocol::{Decoder, Encoder, Packet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout. Covers waiting for the host to run a command.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// A connection to an RCON server.
pub struct Connection {
    config: ConnectionConfig,
    stream: Mutex<Option<TcpStream>>,
    /// Decoder for parsing server packets.
    decoder: Mutex<Decoder>,
    /// Next request ID.
    next_id: AtomicI32,
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            decoder: Mutex::new(Decoder::new()),
            next_id: AtomicI32::new(1),
            connected: AtomicBool::new(false),
        }
    }

    /// Returns the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let tcp_stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        tcp_stream.set_nodelay(true).ok();

        *self.stream.lock().await = Some(tcp_stream);
        self.decoder.lock().await.clear();
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("Connected to {}", self.config.addr);
        Ok(())
    }

    /// Returns a fresh request id. Ids are positive and never -1, which the
    /// server reserves for failed logins.
    pub fn next_request_id(&self) -> i32 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if id <= 0 {
            self.next_id.store(2, Ordering::SeqCst);
            return 1;
        }
        id
    }

    /// Sends one packet.
    pub async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let encoded = Encoder::encode(packet)?;
        tracing::debug!(
            "Sending {} packet id={} ({} bytes)",
            packet.packet_type,
            packet.request_id,
            encoded.len()
        );

        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ClientError::NotConnected)?;
        stream.write_all(&encoded).await.map_err(ClientError::Io)?;
        Ok(())
    }

    /// Reads the next packet, waiting at most the request timeout.
    pub async fn read_packet(&self) -> Result<Packet, ClientError> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, self.read_packet_inner())
            .await
            .map_err(|_| {
                tracing::debug!("Read timeout");
                ClientError::Timeout
            })?
    }

    async fn read_packet_inner(&self) -> Result<Packet, ClientError> {
        let mut buf = vec![0u8; self.config.read_buffer_size];

        loop {
            if let Some(packet) = self.decoder.lock().await.decode_packet()? {
                tracing::debug!(
                    "Received {} packet id={}",
                    packet.packet_type,
                    packet.request_id
                );
                return Ok(packet);
            }

            let n = {
                let mut guard = self.stream.lock().await;
                let stream = guard.as_mut().ok_or(ClientError::NotConnected)?;
                stream.read(&mut buf).await.map_err(ClientError::Io)?
            };

            if n == 0 {
                tracing::debug!("Connection closed by server");
                self.connected.store(false, Ordering::SeqCst);
                return Err(ClientError::ConnectionClosed);
            }

            self.decoder.lock().await.extend(&buf[..n]);
        }
    }

    /// Sends a packet and waits for the next packet from the server.
    pub async fn request(&self, packet: &Packet) -> Result<Packet, ClientError> {
        self.send_packet(packet).await?;
        self.read_packet().await
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        self.decoder.lock().await.clear();

        tracing::debug!("Connection closed");
        Ok(())
    }
}

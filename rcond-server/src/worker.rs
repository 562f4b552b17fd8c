//! Connection worker.
//!
//! One dedicated thread runs a single-threaded tokio runtime that multiplexes
//! the listener, every client socket and the shutdown channel. Each loop
//! iteration handles one readiness event, then sweeps login deadlines and
//! closes every connection marked as disconnected.
//!
//! When a client sends a command the worker blocks inside
//! [`PendingCommand::submit`] until the host thread has executed it. Nothing
//! else runs on the worker's runtime, so all traffic pauses for the duration
//! and commands are executed one at a time.

use crate::auth::PasswordValidator;
use crate::error::ServerError;
use crate::format::format_response;
use crate::rendezvous::PendingCommand;
use crate::service::ServiceStats;
use crate::session::{Session, SessionAction, SessionState};
use crate::signal::{ShutdownListener, ShutdownSignal};
use crate::sockopt;
use futures::stream::{FuturesUnordered, StreamExt};
use rcond_protocol::{Decoder, Encoder, Packet};
use std::collections::HashMap;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "rcon-worker";

const READ_BUFFER_SIZE: usize = 8192;

/// How long a close may block flushing a just-sent response.
const LINGER_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on draining a socket before close.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
const DRAIN_LIMIT: usize = 1024;

/// Everything a worker needs, handed over when it is spawned.
pub(crate) struct WorkerContext {
    pub listener: std::net::TcpListener,
    pub shutdown: ShutdownSignal,
    pub pending: Arc<PendingCommand>,
    pub stop: Arc<AtomicBool>,
    pub stats: Arc<ServiceStats>,
    pub validator: PasswordValidator,
    pub max_clients: usize,
    pub auth_timeout: Duration,
    pub poll_interval: Duration,
}

struct Connection {
    session: Session,
    stream: TcpStream,
    decoder: Decoder,
}

enum Event {
    Shutdown { closed: bool },
    Accept(io::Result<(TcpStream, SocketAddr)>),
    Readable(u64),
    Timeout,
}

/// Accepts clients and runs their sessions.
pub(crate) struct ConnectionWorker {
    pending: Arc<PendingCommand>,
    stop: Arc<AtomicBool>,
    stats: Arc<ServiceStats>,
    validator: PasswordValidator,
    max_clients: usize,
    auth_timeout: Duration,
    poll_interval: Duration,
    connections: HashMap<u64, Connection>,
    next_id: u64,
}

impl ConnectionWorker {
    /// Starts a worker on its own thread.
    pub fn spawn(ctx: WorkerContext) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!("Failed to build RCON worker runtime: {}", e);
                        return;
                    }
                };

                if let Err(e) = runtime.block_on(Self::run(ctx)) {
                    tracing::error!("RCON worker exited with error: {}", e);
                }
            })
    }

    async fn run(ctx: WorkerContext) -> Result<(), ServerError> {
        let listener = TcpListener::from_std(ctx.listener)?;
        let shutdown = ctx.shutdown.into_async()?;

        let mut worker = ConnectionWorker {
            pending: ctx.pending,
            stop: ctx.stop,
            stats: ctx.stats,
            validator: ctx.validator,
            max_clients: ctx.max_clients,
            auth_timeout: ctx.auth_timeout,
            poll_interval: ctx.poll_interval,
            connections: HashMap::new(),
            next_id: 0,
        };

        tracing::debug!("RCON worker started");
        worker.serve(&listener, &shutdown).await;
        tracing::debug!("RCON worker stopped");
        Ok(())
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    async fn serve(&mut self, listener: &TcpListener, shutdown: &ShutdownListener) {
        while !self.stopping() {
            match self.next_event(listener, shutdown).await {
                Event::Shutdown { closed } => {
                    if closed {
                        break;
                    }
                }
                Event::Accept(Ok((stream, addr))) => self.accept(stream, addr),
                Event::Accept(Err(e)) => tracing::warn!("Accept error: {}", e),
                Event::Readable(id) => self.read_connection(id).await,
                Event::Timeout => {}
            }

            self.sweep_timeouts(Instant::now());
            self.close_disconnected();
        }

        for conn in self.connections.values_mut() {
            conn.session.disconnect();
        }
        self.close_disconnected();
    }

    /// Waits for the next readiness event, at most one poll interval.
    async fn next_event(&self, listener: &TcpListener, shutdown: &ShutdownListener) -> Event {
        let mut readable: FuturesUnordered<_> = self
            .connections
            .iter()
            .map(|(&id, conn)| async move {
                // Errors surface on the following read.
                let _ = conn.stream.readable().await;
                id
            })
            .collect();

        tokio::select! {
            biased;

            closed = shutdown.wait() => Event::Shutdown { closed },
            Some(id) = readable.next(), if !readable.is_empty() => Event::Readable(id),
            result = listener.accept() => Event::Accept(result),
            _ = tokio::time::sleep(self.poll_interval) => Event::Timeout,
        }
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.connections.len() >= self.max_clients {
            tracing::warn!("RCON connection limit reached, rejecting {}", addr);
            self.stats
                .connections_rejected
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        if let Err(e) = sockopt::set_keepalive(&stream) {
            tracing::debug!("[{}] Failed to enable keep-alive: {}", addr, e);
        }

        let id = self.next_id;
        self.next_id += 1;

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("[{}] Connection accepted (id {})", addr, id);

        self.connections.insert(
            id,
            Connection {
                session: Session::new(id, addr, self.auth_timeout),
                stream,
                decoder: Decoder::new(),
            },
        );
    }

    /// Reads whatever is available on one connection and handles every
    /// complete packet.
    async fn read_connection(&mut self, id: u64) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        let addr = conn.session.remote_addr;

        let mut buf = [0u8; READ_BUFFER_SIZE];
        match conn.stream.try_read(&mut buf) {
            Ok(0) => {
                tracing::debug!("[{}] Connection closed by client", addr);
                conn.session.disconnect();
                return;
            }
            Ok(n) => conn.decoder.extend(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                tracing::debug!("[{}] Read error: {}", addr, e);
                conn.session.disconnect();
                return;
            }
        }

        while !conn.session.is_disconnected() && !self.stop.load(Ordering::Acquire) {
            let packet = match conn.decoder.decode_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("[{}] Malformed packet: {}", addr, e);
                    conn.session.disconnect();
                    break;
                }
            };

            let was_authenticating = conn.session.state() == SessionState::Authenticating;

            match conn.session.handle_packet(packet, &self.validator) {
                SessionAction::Nothing => {}
                SessionAction::Send(reply) => {
                    if reply.is_auth_failure() {
                        tracing::warn!("[{}] RCON login failed", addr);
                        self.stats.auth_failures.fetch_add(1, Ordering::Relaxed);
                    }
                    send_packet(conn, &reply).await;
                }
                SessionAction::Execute {
                    request_id,
                    command,
                } => {
                    self.stats.commands_total.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("[{}] Command: {}", addr, command);

                    match self.pending.submit(command) {
                        Some(response) => {
                            let bytes =
                                Encoder::encode_response(request_id, &format_response(&response));
                            send_bytes(conn, &bytes).await;
                        }
                        None => {
                            // Released by stop; no response is sent.
                            conn.session.disconnect();
                            break;
                        }
                    }
                }
            }

            if was_authenticating && conn.session.is_connected() {
                tracing::info!("Successful RCON connection from: {}", addr);
            }
        }
    }

    fn sweep_timeouts(&mut self, now: Instant) {
        for conn in self.connections.values_mut() {
            if conn.session.check_deadline(now) {
                tracing::debug!("[{}] Login timed out", conn.session.remote_addr);
            }
        }
    }

    fn close_disconnected(&mut self) {
        let closed: Vec<u64> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.session.is_disconnected())
            .map(|(&id, _)| id)
            .collect();

        for id in closed {
            if let Some(conn) = self.connections.remove(&id) {
                self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                tracing::debug!(
                    "[{}] Connection closed after {:?} ({} commands)",
                    conn.session.remote_addr,
                    conn.session.age(),
                    conn.session.command_count()
                );
                close_gracefully(conn.stream);
            }
        }
    }
}

async fn send_packet(conn: &mut Connection, packet: &Packet) {
    match packet.encode() {
        Ok(bytes) => send_bytes(conn, &bytes).await,
        Err(e) => {
            tracing::warn!("[{}] Failed to encode reply: {}", conn.session.remote_addr, e);
            conn.session.disconnect();
        }
    }
}

async fn send_bytes(conn: &mut Connection, bytes: &[u8]) {
    if let Err(e) = conn.stream.write_all(bytes).await {
        tracing::debug!("[{}] Write error: {}", conn.session.remote_addr, e);
        conn.session.disconnect();
    }
}

/// Closes a client socket without cutting off a response still in flight.
fn close_gracefully(stream: TcpStream) {
    let _ = sockopt::set_linger(&stream, LINGER_TIMEOUT);

    let Ok(stream) = stream.into_std() else {
        return;
    };
    let _ = stream.set_nonblocking(false);
    let _ = stream.shutdown(Shutdown::Both);
    let _ = stream.set_read_timeout(Some(DRAIN_TIMEOUT));

    let mut drain = [0u8; DRAIN_LIMIT];
    let _ = (&stream).read(&mut drain);
}

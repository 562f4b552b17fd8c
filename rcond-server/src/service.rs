//! RCON service lifecycle and host bridge.
//!
//! The host owns an [`RconService`] and calls [`RconService::tick`] from its
//! own thread at a regular cadence. Commands received by the worker are
//! executed inside `tick`, so the executor may freely touch host state.

use crate::auth::PasswordValidator;
use crate::config::{ConfigError, DEFAULT_AUTH_TIMEOUT, DEFAULT_MAX_CLIENTS, DEFAULT_POLL_INTERVAL};
use crate::error::ServerError;
use crate::format::clean;
use crate::rendezvous::PendingCommand;
use crate::signal::ShutdownChannel;
use crate::worker::{ConnectionWorker, WorkerContext};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Time given to the worker to observe the stop flag before the rendezvous
/// is cancelled.
const STOP_GRACE: Duration = Duration::from_millis(50);

/// Service configuration.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Shared login password. Must not be empty.
    pub password: String,
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum simultaneous connections. Must be at least 1.
    pub max_clients: usize,
    /// Time a new connection has to log in.
    pub auth_timeout: Duration,
    /// Upper bound on one readiness wait of the worker loop.
    pub poll_interval: Duration,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("password", &"<redacted>")
            .field("bind_addr", &self.bind_addr)
            .field("max_clients", &self.max_clients)
            .field("auth_timeout", &self.auth_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ServiceConfig {
    pub fn new(password: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            password: password.into(),
            bind_addr,
            max_clients: DEFAULT_MAX_CLIENTS,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the connection cap.
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Sets the login deadline.
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Sets the worker poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::ValidationError(
                "password must not be empty".to_string(),
            ));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::ValidationError(
                "max_clients must be at least 1".to_string(),
            ));
        }
        if self.auth_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "auth_timeout must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Service statistics.
#[derive(Debug, Default)]
pub struct ServiceStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub auth_failures: AtomicU64,
    pub commands_total: AtomicU64,
    pub worker_restarts: AtomicU64,
}

/// Executes commands on behalf of RCON clients.
///
/// Called only from the thread that calls [`RconService::tick`]. A slow
/// executor stalls all RCON traffic until it returns.
pub trait CommandExecutor {
    /// Runs `command` and returns its textual output, possibly empty.
    fn execute(&mut self, command: &str) -> String;
}

impl<F> CommandExecutor for F
where
    F: FnMut(&str) -> String,
{
    fn execute(&mut self, command: &str) -> String {
        self(command)
    }
}

/// A running RCON server.
pub struct RconService {
    config: ServiceConfig,
    listener: Option<std::net::TcpListener>,
    local_addr: SocketAddr,
    shutdown: ShutdownChannel,
    pending: Arc<PendingCommand>,
    stop: Arc<AtomicBool>,
    stats: Arc<ServiceStats>,
    validator: PasswordValidator,
    worker: Option<JoinHandle<()>>,
}

impl RconService {
    /// Binds the listener and starts the connection worker.
    pub fn start(config: ServiceConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener =
            std::net::TcpListener::bind(config.bind_addr).map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let shutdown = ShutdownChannel::new().map_err(ServerError::SignalChannel)?;

        let mut service = Self {
            validator: PasswordValidator::new(&config.password),
            config,
            listener: Some(listener),
            local_addr,
            shutdown,
            pending: Arc::new(PendingCommand::new()),
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(ServiceStats::default()),
            worker: None,
        };
        service.spawn_worker()?;

        tracing::info!("RCON running on {}", local_addr);
        Ok(service)
    }

    fn spawn_worker(&mut self) -> Result<(), ServerError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or(ServerError::ShuttingDown)?
            .try_clone()
            .map_err(ServerError::WorkerSpawn)?;
        let shutdown = self
            .shutdown
            .subscribe()
            .map_err(ServerError::WorkerSpawn)?;

        let ctx = WorkerContext {
            listener,
            shutdown,
            pending: self.pending.clone(),
            stop: self.stop.clone(),
            stats: self.stats.clone(),
            validator: self.validator.clone(),
            max_clients: self.config.max_clients,
            auth_timeout: self.config.auth_timeout,
            poll_interval: self.config.poll_interval,
        };

        let handle = ConnectionWorker::spawn(ctx).map_err(ServerError::WorkerSpawn)?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Services the worker from the host thread.
    ///
    /// Restarts the worker if it has died, then executes the pending command,
    /// if any. Returns `true` if a command was executed.
    pub fn tick(&mut self, executor: &mut impl CommandExecutor) -> bool {
        if self.stop.load(Ordering::Acquire) {
            return false;
        }

        if self.worker.as_ref().map_or(true, |w| w.is_finished()) {
            self.restart_worker();
        }

        let Some(command) = self.pending.take_command() else {
            return false;
        };

        let output = executor.execute(&command);
        self.pending.fulfill(clean(&output));
        true
    }

    fn restart_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("RCON worker panicked");
            }
        }

        // The old worker's connections went away with it.
        self.stats.connections_active.store(0, Ordering::Relaxed);

        match self.spawn_worker() {
            Ok(()) => {
                self.stats.worker_restarts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("RCON worker terminated unexpectedly, restarted");
            }
            Err(e) => tracing::error!("Failed to restart RCON worker: {}", e),
        }
    }

    /// Stops the worker and closes the listener. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.listener.is_none() {
            return;
        }

        self.stop.store(true, Ordering::Release);
        self.shutdown.close();

        std::thread::sleep(STOP_GRACE);
        self.pending.cancel();

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("RCON worker panicked");
            }
        }

        self.listener = None;
        tracing::info!("RCON stopped");
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the service statistics.
    pub fn stats(&self) -> Arc<ServiceStats> {
        self.stats.clone()
    }

    /// Returns whether the worker is blocked waiting for a command to be
    /// executed.
    pub fn is_command_pending(&self) -> bool {
        self.pending.is_awaiting()
    }

    /// Returns whether the service has not been stopped.
    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    /// Returns the configuration the service was started with.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

impl Drop for RconService {
    fn drop(&mut self) {
        self.stop();
    }
}

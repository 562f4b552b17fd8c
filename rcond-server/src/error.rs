//! Server error types.

use crate::config::ConfigError;
use std::net::SocketAddr;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create shutdown channel: {0}")]
    SignalChannel(#[source] std::io::Error),

    #[error("failed to spawn connection worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server shutting down")]
    ShuttingDown,
}

//! # rcond-server
//!
//! RCON server core for rcond.
//!
//! This crate provides:
//! - A connection worker multiplexing the listener and all clients on one thread
//! - Per-connection login/command state machine with auth deadlines
//! - A blocking handoff that runs commands on the host's own thread
//! - Service lifecycle: start, periodic tick, worker restart, stop
//! - Layered configuration (defaults, YAML file, environment)

pub mod auth;
pub mod config;
pub mod error;
pub mod format;
pub mod rendezvous;
pub mod service;
pub mod session;
pub mod signal;
pub mod sockopt;
mod worker;

pub use auth::PasswordValidator;
pub use config::{Config, ConfigError, RconConfig};
pub use error::ServerError;
pub use rendezvous::PendingCommand;
pub use service::{CommandExecutor, RconService, ServiceConfig, ServiceStats};
pub use session::{Session, SessionAction, SessionState};
pub use worker::WORKER_THREAD_NAME;

//! # rcond-client
//!
//! Client library for rcond.
//!
//! This crate provides:
//! - Async TCP connection with connect and request timeouts
//! - Packet-level send/receive over the RCON framing
//! - High-level login and command API

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;

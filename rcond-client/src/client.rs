//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use rcond_protocol::{Packet, PacketType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// High-level RCON client.
pub struct Client {
    conn: Arc<Connection>,
    authenticated: AtomicBool,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
            authenticated: AtomicBool::new(false),
        }
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.authenticated.store(false, Ordering::SeqCst);
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Returns whether a login succeeded on the current connection.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.authenticated.store(false, Ordering::SeqCst);
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Logs in with the server password.
    ///
    /// The server closes the connection after a rejected login, so the
    /// client has to reconnect before trying again.
    pub async fn login(&self, password: &str) -> Result<(), ClientError> {
        let id = self.conn.next_request_id();
        let reply = self.conn.request(&Packet::login(id, password)).await?;

        if reply.is_auth_failure() {
            tracing::debug!("Login rejected");
            return Err(ClientError::AuthFailed);
        }
        if reply.packet_type != PacketType::AUTH_RESPONSE || reply.request_id != id {
            return Err(ClientError::UnexpectedResponse {
                expected: id,
                actual: reply.request_id,
            });
        }

        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Runs a command and returns its output.
    ///
    /// The server never answers an empty command, so one is not sent.
    pub async fn command(&self, command: &str) -> Result<String, ClientError> {
        if command.is_empty() {
            return Ok(String::new());
        }

        let id = self.conn.next_request_id();
        let reply = self.conn.request(&Packet::command(id, command)).await?;

        if reply.packet_type != PacketType::RESPONSE_VALUE || reply.request_id != id {
            return Err(ClientError::UnexpectedResponse {
                expected: id,
                actual: reply.request_id,
            });
        }

        Ok(reply.text().into_owned())
    }
}

//! Per-connection protocol state.
//!
//! A `Session` decides what to do with each decoded packet. It never touches
//! the socket: the worker performs the returned action.

use crate::auth::PasswordValidator;
use rcond_protocol::{Packet, PacketType};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, waiting for a login packet.
    Authenticating,
    /// Logged in, commands are relayed to the host.
    Connected,
    /// Marked for close. Terminal.
    Disconnected,
}

/// What the worker must do after a packet has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send this packet to the client.
    Send(Packet),
    /// Run a command on the host and reply with a response value.
    Execute { request_id: i32, command: String },
    /// Nothing to send.
    Nothing,
}

/// A client session.
#[derive(Debug)]
pub struct Session {
    /// Connection id, unique among live connections.
    pub id: u64,

    /// Remote address.
    pub remote_addr: SocketAddr,

    state: SessionState,

    /// Login must complete before this instant.
    auth_deadline: Instant,

    /// Commands relayed to the host.
    command_count: u64,

    created_at: Instant,
}

impl Session {
    /// Creates a session in `Authenticating` with a deadline `auth_timeout`
    /// from now.
    pub fn new(id: u64, remote_addr: SocketAddr, auth_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            id,
            remote_addr,
            state: SessionState::Authenticating,
            auth_deadline: now + auth_timeout,
            command_count: 0,
            created_at: now,
        }
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_disconnected(&self) -> bool {
        self.state == SessionState::Disconnected
    }

    /// Marks the session for close.
    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
    }

    /// Returns the number of commands relayed so far.
    pub fn command_count(&self) -> u64 {
        self.command_count
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Handles one decoded packet.
    pub fn handle_packet(&mut self, packet: Packet, validator: &PasswordValidator) -> SessionAction {
        match (self.state, packet.packet_type) {
            (SessionState::Disconnected, _) => SessionAction::Nothing,

            (SessionState::Authenticating, PacketType::LOGIN) => {
                if validator.validate(&packet.payload) {
                    self.state = SessionState::Connected;
                    SessionAction::Send(Packet::auth_response(packet.request_id))
                } else {
                    self.state = SessionState::Disconnected;
                    SessionAction::Send(Packet::auth_failure())
                }
            }

            (SessionState::Authenticating, PacketType::COMMAND) => {
                self.state = SessionState::Disconnected;
                SessionAction::Nothing
            }

            // A second login on an authenticated connection ends it.
            (SessionState::Connected, PacketType::LOGIN) => {
                self.state = SessionState::Disconnected;
                SessionAction::Nothing
            }

            (SessionState::Connected, PacketType::COMMAND) => {
                if packet.payload.is_empty() {
                    return SessionAction::Nothing;
                }
                self.command_count += 1;
                SessionAction::Execute {
                    request_id: packet.request_id,
                    command: packet.text().trim_start().to_string(),
                }
            }

            // Unknown packet types are ignored in every live state.
            _ => SessionAction::Nothing,
        }
    }

    /// Disconnects a session still authenticating past its deadline.
    /// Returns `true` if this call timed the session out.
    pub fn check_deadline(&mut self, now: Instant) -> bool {
        if self.state == SessionState::Authenticating && now > self.auth_deadline {
            self.state = SessionState::Disconnected;
            return true;
        }
        false
    }
}

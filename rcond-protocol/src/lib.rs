//! # rcond-protocol
//!
//! Wire protocol implementation for rcond (Source RCON).
//!
//! This crate provides:
//! - Little-endian, length-prefixed packet framing
//! - Packet type constants for login, command and response packets
//! - An incremental decoder for buffering partial reads
//! - Protocol error types

pub mod codec;
pub mod error;
pub mod packet;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use packet::{Packet, PacketType, AUTH_FAILURE_ID};

/// Default RCON port.
pub const DEFAULT_PORT: u16 = 19132;

/// Largest value accepted in the size field of an incoming packet.
pub const MAX_PACKET_SIZE: i32 = 65535;

/// Smallest size field that still covers the request id and packet type.
pub const MIN_PACKET_SIZE: i32 = 8;

/// Bytes in the size field itself.
pub const SIZE_FIELD_LEN: usize = 4;

/// Bytes counted by the size field besides the payload:
/// request id (4), packet type (4) and the two NUL terminators.
pub const PACKET_OVERHEAD: usize = 10;

/// Largest payload that fits in a single packet.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE as usize - PACKET_OVERHEAD;

//! Packet format for Source RCON.
//!
//! Packet layout (all integers little-endian `i32`):
//!
//! ```text
//! +--------+------------+-------------+-------------------+-----------+
//! | size   | request_id | packet_type | payload           | 0x00 0x00 |
//! | 4 bytes| 4 bytes    | 4 bytes     | size - 10 bytes   | 2 bytes   |
//! +--------+------------+-------------+-------------------+-----------+
//! ```
//!
//! `size` counts everything after the size field, so a packet with an empty
//! payload has `size == 10`.

use crate::error::ProtocolError;
use crate::{MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, MIN_PACKET_SIZE, PACKET_OVERHEAD, SIZE_FIELD_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::fmt;

/// Request id the server answers a failed login with.
pub const AUTH_FAILURE_ID: i32 = -1;

/// Packet type field.
///
/// Type `2` means `Command` when sent by a client and `AuthResponse` when
/// sent by the server, so the type is kept as a raw value instead of an
/// enum. Unknown values survive decoding and are left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketType(i32);

impl PacketType {
    /// Server to client: command output.
    pub const RESPONSE_VALUE: PacketType = PacketType(0);
    /// Client to server: execute a command.
    pub const COMMAND: PacketType = PacketType(2);
    /// Server to client: login result.
    pub const AUTH_RESPONSE: PacketType = PacketType(2);
    /// Client to server: authenticate with the password.
    pub const LOGIN: PacketType = PacketType(3);

    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl From<i32> for PacketType {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "RESPONSE_VALUE"),
            2 => write!(f, "COMMAND"),
            3 => write!(f, "LOGIN"),
            other => write!(f, "UNKNOWN({})", other),
        }
    }
}

/// A single RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Client-chosen correlation id, echoed back by the server.
    pub request_id: i32,
    /// Packet type.
    pub packet_type: PacketType,
    /// Payload bytes without the trailing NUL terminators.
    ///
    /// Clients are not required to send UTF-8, so the payload is kept raw.
    pub payload: Bytes,
}

impl Packet {
    /// Creates a new packet.
    pub fn new(request_id: i32, packet_type: PacketType, payload: impl AsRef<[u8]>) -> Self {
        Self {
            request_id,
            packet_type,
            payload: Bytes::copy_from_slice(payload.as_ref()),
        }
    }

    /// Creates a login packet carrying the password.
    pub fn login(request_id: i32, password: impl AsRef<[u8]>) -> Self {
        Self::new(request_id, PacketType::LOGIN, password)
    }

    /// Creates a command packet.
    pub fn command(request_id: i32, command: impl AsRef<[u8]>) -> Self {
        Self::new(request_id, PacketType::COMMAND, command)
    }

    /// Creates the reply to a successful login.
    pub fn auth_response(request_id: i32) -> Self {
        Self {
            request_id,
            packet_type: PacketType::AUTH_RESPONSE,
            payload: Bytes::new(),
        }
    }

    /// Creates the reply to a failed login.
    pub fn auth_failure() -> Self {
        Self::auth_response(AUTH_FAILURE_ID)
    }

    /// Creates a command response.
    pub fn response_value(request_id: i32, body: impl AsRef<[u8]>) -> Self {
        Self::new(request_id, PacketType::RESPONSE_VALUE, body)
    }

    /// Returns whether this is a login reply that signals a rejected password.
    pub fn is_auth_failure(&self) -> bool {
        self.packet_type == PacketType::AUTH_RESPONSE && self.request_id == AUTH_FAILURE_ID
    }

    /// Returns the payload as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Value written to the size field for this packet.
    pub fn size_field(&self) -> usize {
        self.payload.len() + PACKET_OVERHEAD
    }

    /// Total number of bytes on the wire, including the size field.
    pub fn encoded_len(&self) -> usize {
        SIZE_FIELD_LEN + self.size_field()
    }

    /// Encodes the packet into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut buf)?;
        Ok(buf)
    }

    /// Appends the encoded packet to `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        buf.reserve(self.encoded_len());
        buf.put_i32_le(self.size_field() as i32);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.packet_type.raw());
        buf.put_slice(&self.payload);
        buf.put_slice(&[0, 0]);
        Ok(())
    }

    /// Validates a size field read from the wire.
    pub fn check_size(size: i32) -> Result<usize, ProtocolError> {
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            return Err(ProtocolError::InvalidSize(size));
        }
        Ok(size as usize)
    }

    /// Decodes a packet from bytes.
    ///
    /// Returns `Ok(Some(packet))` if a complete packet was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// The size field is validated as soon as it is available, so an
    /// oversized declaration fails without waiting for its body.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < SIZE_FIELD_LEN {
            return Ok(None);
        }

        let size = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let body_len = Self::check_size(size)?;

        if buf.len() < SIZE_FIELD_LEN + body_len {
            return Ok(None);
        }

        buf.advance(SIZE_FIELD_LEN);
        let mut body = buf.split_to(body_len);

        let request_id = body.get_i32_le();
        let packet_type = PacketType::new(body.get_i32_le());

        // Payload plus terminator; clients differ in how many NULs they send.
        let end = body.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let payload = body.split_to(end).freeze();

        Ok(Some(Self {
            request_id,
            packet_type,
            payload,
        }))
    }
}

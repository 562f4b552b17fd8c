//! Encoder and buffered decoder for RCON packets.

use crate::error::ProtocolError;
use crate::packet::Packet;
use crate::MAX_PAYLOAD_SIZE;
use bytes::BytesMut;

/// Encodes packets into bytes.
pub struct Encoder;

impl Encoder {
    /// Encodes a packet.
    pub fn encode(packet: &Packet) -> Result<BytesMut, ProtocolError> {
        packet.encode()
    }

    /// Encodes a command response, truncating the body so it fits in one
    /// packet. Multi-packet responses are not supported.
    pub fn encode_response(request_id: i32, body: &str) -> BytesMut {
        let body = truncate_to_boundary(body, MAX_PAYLOAD_SIZE);
        let mut buf = BytesMut::new();
        // Cannot fail: the body was truncated to the payload limit above.
        let _ = Packet::response_value(request_id, body).encode_to(&mut buf);
        buf
    }
}

/// Returns the longest prefix of `text` that is at most `max` bytes and ends
/// on a character boundary.
pub fn truncate_to_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Buffers raw bytes and yields complete packets.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next packet from the buffer.
    pub fn decode_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        Packet::decode(&mut self.buffer)
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

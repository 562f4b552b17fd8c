//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while framing or parsing packets.
///
/// Every variant is fatal for the connection it occurred on: the RCON
/// protocol has no error packet, so the server answers a violation by
/// disconnecting.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid packet size: {0} (allowed 8..=65535)")]
    InvalidSize(i32),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

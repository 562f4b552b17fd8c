//! Socket options for accepted client sockets.

use socket2::SockRef;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// Enables TCP keep-alive on a client socket.
pub fn set_keepalive(stream: &TcpStream) -> io::Result<()> {
    SockRef::from(stream).set_keepalive(true)
}

/// Makes `close` block up to `timeout` while buffered writes are flushed.
pub fn set_linger(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    SockRef::from(stream).set_linger(Some(timeout))
}

//! Shutdown channel.
//!
//! A connected pair of sockets whose only job is to wake a worker blocked in
//! its readiness wait. The service keeps one end and closes it on stop; every
//! worker holds a clone of the other end and sees it turn readable (EOF).
//! Unix domain sockets are used on unix, a loopback TCP pair elsewhere.

use std::io;

#[cfg(unix)]
type RawEnd = std::os::unix::net::UnixStream;
#[cfg(unix)]
type AsyncEnd = tokio::net::UnixStream;

#[cfg(not(unix))]
type RawEnd = std::net::TcpStream;
#[cfg(not(unix))]
type AsyncEnd = tokio::net::TcpStream;

/// Host side of the shutdown channel.
pub struct ShutdownChannel {
    host: Option<RawEnd>,
    worker: RawEnd,
}

impl ShutdownChannel {
    /// Creates a connected channel.
    pub fn new() -> io::Result<Self> {
        let (host, worker) = pair()?;
        worker.set_nonblocking(true)?;
        Ok(Self {
            host: Some(host),
            worker,
        })
    }

    /// Returns a new handle on the worker end.
    pub fn subscribe(&self) -> io::Result<ShutdownSignal> {
        Ok(ShutdownSignal {
            raw: self.worker.try_clone()?,
        })
    }

    /// Closes the host end, waking every worker blocked on its signal.
    pub fn close(&mut self) {
        if let Some(host) = self.host.take() {
            let _ = host.shutdown(std::net::Shutdown::Both);
        }
    }

    /// Returns whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.host.is_none()
    }
}

#[cfg(unix)]
fn pair() -> io::Result<(RawEnd, RawEnd)> {
    RawEnd::pair()
}

#[cfg(not(unix))]
fn pair() -> io::Result<(RawEnd, RawEnd)> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    let host = RawEnd::connect(listener.local_addr()?)?;
    let (worker, _) = listener.accept()?;
    Ok((host, worker))
}

/// Worker side of the shutdown channel.
pub struct ShutdownSignal {
    raw: RawEnd,
}

impl ShutdownSignal {
    /// Registers the handle with the current tokio runtime.
    pub(crate) fn into_async(self) -> io::Result<ShutdownListener> {
        Ok(ShutdownListener {
            inner: AsyncEnd::from_std(self.raw)?,
        })
    }
}

/// Runtime-registered worker end.
pub(crate) struct ShutdownListener {
    inner: AsyncEnd,
}

impl ShutdownListener {
    /// Waits until the channel is readable. Returns `true` once the host end
    /// has been closed.
    pub(crate) async fn wait(&self) -> bool {
        if self.inner.readable().await.is_err() {
            return true;
        }
        let mut buf = [0u8; 16];
        match self.inner.try_read(&mut buf) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(_) => true,
        }
    }
}

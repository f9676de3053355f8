use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// A connected, message-preserving endpoint.
///
/// Every `send_datagram` call produces exactly one datagram on the peer and
/// every `recv_datagram` call consumes exactly one. A receive buffer smaller
/// than the datagram truncates it, so callers size buffers one byte past the
/// largest message they accept and treat a full buffer as oversize.
pub trait Datagram {
    /// Send one datagram to the connected peer (blocking).
    fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize>;

    /// Receive one datagram from the connected peer (blocking).
    fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Set the timeout applied to `recv_datagram`. `None` blocks indefinitely.
    fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Set the timeout applied to `send_datagram`. `None` blocks indefinitely.
    fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<()>;
}

#[cfg(unix)]
impl Datagram for std::os::unix::net::UnixDatagram {
    fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.send(buf)
    }

    fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.recv(buf)
    }

    fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.set_read_timeout(timeout).map_err(Into::into)
    }

    fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.set_write_timeout(timeout).map_err(Into::into)
    }
}

impl<T: Datagram + ?Sized> Datagram for &T {
    fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).send_datagram(buf)
    }

    fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).recv_datagram(buf)
    }

    fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_recv_timeout(timeout)
    }

    fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_send_timeout(timeout)
    }
}

impl<T: Datagram + ?Sized> Datagram for std::sync::Arc<T> {
    fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).send_datagram(buf)
    }

    fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).recv_datagram(buf)
    }

    fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_recv_timeout(timeout)
    }

    fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_send_timeout(timeout)
    }
}

/// Address of the endpoint a datagram arrived from.
///
/// Replies are routed back to this address. Unbound senders have no path
/// and cannot be answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusAddr {
    path: Option<PathBuf>,
}

impl BusAddr {
    /// Address bound at a filesystem path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Address of an unbound sender.
    pub fn unnamed() -> Self {
        Self { path: None }
    }

    /// The filesystem path, if the sender was bound.
    pub fn as_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[cfg(unix)]
    pub(crate) fn from_std(addr: &std::os::unix::net::SocketAddr) -> Self {
        Self {
            path: addr.as_pathname().map(Path::to_path_buf),
        }
    }
}

impl std::fmt::Display for BusAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}", path.display()),
            None => f.write_str("<unnamed>"),
        }
    }
}

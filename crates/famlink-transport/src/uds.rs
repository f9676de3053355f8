use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{BusAddr, Datagram};

/// Default permission mode for created socket paths.
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Ownership of a bound socket path.
///
/// Removes the path on drop, but only while it still refers to the socket
/// this process created.
#[derive(Debug)]
pub(crate) struct SocketPath {
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl SocketPath {
    /// Validate `path` and clear a stale socket left at it.
    pub(crate) fn prepare(path: &Path) -> Result<PathBuf> {
        let path = path.to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: MAX_PATH_LEN,
            });
        }

        // Remove stale socket if it exists, but never remove non-socket files.
        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::Bind {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        Ok(path)
    }

    /// Record ownership of a freshly bound path and apply `mode`.
    pub(crate) fn adopt(path: PathBuf, mode: u32) -> Result<Self> {
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            TransportError::Bind {
                path: path.clone(),
                source: e,
            }
        })?;
        let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        Ok(Self {
            created_inode: Some((metadata.dev(), metadata.ino())),
            path,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketPath {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

fn bind_datagram(path: &Path, mode: u32) -> Result<(UnixDatagram, SocketPath)> {
    let path = SocketPath::prepare(path)?;
    let socket = UnixDatagram::bind(&path).map_err(|e| TransportError::Bind {
        path: path.clone(),
        source: e,
    })?;
    let guard = SocketPath::adopt(path, mode)?;
    Ok((socket, guard))
}

/// Service side of the bus.
///
/// Bound at a well-known path; receives requests from any client endpoint
/// and answers each at the address it came from.
#[derive(Debug)]
pub struct BusSocket {
    socket: UnixDatagram,
    path: SocketPath,
}

impl BusSocket {
    /// Bind the service socket at `path` with [`DEFAULT_SOCKET_MODE`].
    ///
    /// If a socket already exists at `path` it is removed first (stale socket
    /// cleanup). Any other kind of file makes the bind fail.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, DEFAULT_SOCKET_MODE)
    }

    /// Bind the service socket with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let (socket, path) = bind_datagram(path.as_ref(), mode)?;
        info!(path = ?path.path(), "service socket bound");
        Ok(Self { socket, path })
    }

    /// Receive one datagram and the address it came from (blocking).
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, BusAddr)> {
        let (n, addr) = self.socket.recv_from(buf)?;
        Ok((n, BusAddr::from_std(&addr)))
    }

    /// Send one datagram to `addr`.
    pub fn send_to(&self, buf: &[u8], addr: &BusAddr) -> Result<usize> {
        let path = addr.as_path().ok_or(TransportError::UnnamedPeer)?;
        self.socket.send_to(buf, path).map_err(Into::into)
    }

    /// Set the receive timeout. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        self.path.path()
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-datagram"
    }
}

/// Client side of the bus.
///
/// Bound at its own path so the service can answer it, and connected to the
/// service path so only service datagrams are delivered.
#[derive(Debug)]
pub struct BusEndpoint {
    socket: UnixDatagram,
    local: SocketPath,
    remote: PathBuf,
}

impl BusEndpoint {
    /// Bind at `local` and connect to the service at `remote`.
    pub fn connect(local: impl AsRef<Path>, remote: impl AsRef<Path>) -> Result<Self> {
        let (socket, local) = bind_datagram(local.as_ref(), DEFAULT_SOCKET_MODE)?;
        let remote = remote.as_ref().to_path_buf();
        socket
            .connect(&remote)
            .map_err(|e| TransportError::Connect {
                path: remote.clone(),
                source: e,
            })?;
        debug!(local = ?local.path(), remote = ?remote, "endpoint connected");
        Ok(Self {
            socket,
            local,
            remote,
        })
    }

    /// The path this endpoint is bound to.
    pub fn local_path(&self) -> &Path {
        self.local.path()
    }

    /// The service path this endpoint is connected to.
    pub fn remote_path(&self) -> &Path {
        &self.remote
    }
}

impl Datagram for BusEndpoint {
    fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.socket.send(buf)
    }

    fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.socket.recv(buf)
    }

    fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_write_timeout(timeout).map_err(Into::into)
    }
}

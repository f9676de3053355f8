use std::path::Path;

use tokio::net::UnixDatagram;
use tracing::info;

use crate::error::{Result, TransportError};
use crate::traits::BusAddr;
use crate::uds::{SocketPath, DEFAULT_SOCKET_MODE};

/// Async service side of the bus, backed by tokio.
///
/// Mirrors [`crate::BusSocket`]; must be bound from within a tokio runtime.
#[derive(Debug)]
pub struct AsyncBusSocket {
    socket: UnixDatagram,
    path: SocketPath,
}

impl AsyncBusSocket {
    /// Bind the service socket at `path` with the default mode.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, DEFAULT_SOCKET_MODE)
    }

    /// Bind the service socket with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = SocketPath::prepare(path.as_ref())?;
        let socket = UnixDatagram::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;
        let path = SocketPath::adopt(path, mode)?;
        info!(path = ?path.path(), "async service socket bound");
        Ok(Self { socket, path })
    }

    /// Receive one datagram and the address it came from.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, BusAddr)> {
        let (n, addr) = self.socket.recv_from(buf).await?;
        let addr = match addr.as_pathname() {
            Some(path) => BusAddr::from_path(path),
            None => BusAddr::unnamed(),
        };
        Ok((n, addr))
    }

    /// Send one datagram to `addr`.
    pub async fn send_to(&self, buf: &[u8], addr: &BusAddr) -> Result<usize> {
        let path = addr.as_path().ok_or(TransportError::UnnamedPeer)?;
        self.socket.send_to(buf, path).await.map_err(Into::into)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        self.path.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Datagram;
    use crate::uds::BusEndpoint;

    #[tokio::test]
    async fn async_socket_answers_blocking_endpoint() {
        let dir = std::env::temp_dir().join(format!("famlink-async-uds-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let service_path = dir.join("service.sock");

        let service = AsyncBusSocket::bind(&service_path).unwrap();
        let client = BusEndpoint::connect(dir.join("client.sock"), &service_path).unwrap();
        client.send_datagram(b"ping").unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = service.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        service.send_to(b"pong", &from).await.unwrap();

        let n = client.recv_datagram(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");

        drop(service);
        assert!(!service_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use famlink_frame::{decode_message, encode_message, Message, DEFAULT_MAX_MESSAGE};
use famlink_schema::FamilyRegistry;
use famlink_transport::{BusAddr, TransportError};
#[cfg(unix)]
use famlink_transport::BusSocket;
use tracing::{info, warn};

use crate::dispatch::Dispatch;
use crate::error::{PeerError, Result};
use crate::resolve::{control_dispatcher, CONTROL_FAMILY_ID};

/// Service loop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// How often the blocking loop re-checks its running flag.
    pub poll_interval: Duration,
    /// Largest datagram accepted.
    pub max_message_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}

/// Hosts one dispatcher per family plus the control family.
///
/// Only families with a dispatcher resolve through the control family.
///
/// Requests are handled one at a time in arrival order. A request that fails
/// is logged and left unanswered.
pub struct Service {
    registry: Arc<FamilyRegistry>,
    dispatchers: HashMap<u16, Box<dyn Dispatch>>,
    config: ServiceConfig,
}

impl Service {
    pub fn new(registry: Arc<FamilyRegistry>) -> Result<Self> {
        let mut service = Self {
            registry,
            dispatchers: HashMap::new(),
            config: ServiceConfig::default(),
        };
        service.install_control()?;
        Ok(service)
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve a family. Its id must match the one the registry assigned.
    pub fn register(&mut self, dispatcher: impl Dispatch + 'static) -> Result<()> {
        let name = dispatcher.family().name();
        let id = self
            .registry
            .resolve(name)
            .map_err(|_| PeerError::UnknownFamily(name.to_owned()))?;
        if id != dispatcher.family_id() {
            return Err(PeerError::UnknownFamily(format!(
                "{name} is registered as {id:#06x}, dispatcher serves {:#06x}",
                dispatcher.family_id()
            )));
        }
        if self.dispatchers.contains_key(&id) {
            return Err(PeerError::ProtocolViolation(format!(
                "family {name} already has a dispatcher"
            )));
        }
        info!(family = name, id, "serving family");
        self.dispatchers.insert(id, Box::new(dispatcher));
        self.install_control()
    }

    /// Ids of the families with a dispatcher, control family excluded.
    pub fn served(&self) -> BTreeSet<u16> {
        self.dispatchers
            .keys()
            .copied()
            .filter(|&id| id != CONTROL_FAMILY_ID)
            .collect()
    }

    fn install_control(&mut self) -> Result<()> {
        let control = control_dispatcher(Arc::clone(&self.registry), self.served())?;
        self.dispatchers.insert(CONTROL_FAMILY_ID, Box::new(control));
        Ok(())
    }

    pub fn registry(&self) -> &Arc<FamilyRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Decode and dispatch one datagram, returning the replies to send.
    ///
    /// An error is the per-request failure signal: nothing is sent for it.
    pub fn handle_datagram(&self, datagram: &[u8]) -> Result<Vec<Message>> {
        let msg = decode_message(datagram)?;
        let dispatcher = self
            .dispatchers
            .get(&msg.family_id)
            .ok_or_else(|| PeerError::UnknownFamily(format!("id {:#06x}", msg.family_id)))?;
        dispatcher.dispatch(&msg)
    }

    /// Handle a datagram from `from` and encode the replies. Failures are
    /// logged here.
    fn respond(&self, datagram: &[u8], from: &BusAddr) -> Vec<BytesMut> {
        let replies = match self.handle_datagram(datagram) {
            Ok(replies) => replies,
            Err(err) => {
                warn!(peer = %from, error = %err, "request dropped");
                return Vec::new();
            }
        };

        let mut encoded = Vec::with_capacity(replies.len());
        for reply in &replies {
            let mut buf = BytesMut::with_capacity(reply.wire_size());
            if let Err(err) = encode_message(reply, &mut buf) {
                warn!(peer = %from, error = %err, "reply encoding failed, request dropped");
                return Vec::new();
            }
            encoded.push(buf);
        }
        encoded
    }

    /// Serve `socket` until `running` is cleared (blocking).
    #[cfg(unix)]
    pub fn serve(&self, socket: &BusSocket, running: &AtomicBool) -> Result<()> {
        socket.set_read_timeout(Some(self.config.poll_interval))?;
        let mut buf = vec![0u8; self.config.max_message_size + 1];
        info!(path = ?socket.path(), "service running");

        while running.load(Ordering::SeqCst) {
            let (received, from) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(TransportError::Io(err))
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(err.into()),
            };
            if received > self.config.max_message_size {
                warn!(peer = %from, size = received, "oversized datagram dropped");
                continue;
            }

            for reply in self.respond(&buf[..received], &from) {
                if let Err(err) = socket.send_to(&reply, &from) {
                    warn!(peer = %from, error = %err, "failed to send reply");
                    break;
                }
            }
        }

        info!("service stopped");
        Ok(())
    }

    /// Serve `socket` until `shutdown` resolves.
    #[cfg(all(unix, feature = "async"))]
    pub async fn serve_async<F>(
        &self,
        socket: &famlink_transport::AsyncBusSocket,
        shutdown: F,
    ) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut buf = vec![0u8; self.config.max_message_size + 1];
        info!(path = ?socket.path(), "async service running");

        loop {
            let received = tokio::select! {
                _ = &mut shutdown => break,
                received = socket.recv_from(&mut buf) => received,
            };
            let (received, from) = match received {
                Ok(received) => received,
                Err(TransportError::Io(err)) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if received > self.config.max_message_size {
                warn!(peer = %from, size = received, "oversized datagram dropped");
                continue;
            }

            for reply in self.respond(&buf[..received], &from) {
                if let Err(err) = socket.send_to(&reply, &from).await {
                    warn!(peer = %from, error = %err, "failed to send reply");
                    break;
                }
            }
        }

        info!("async service stopped");
        Ok(())
    }
}

//! Client side of the demo family.

#[cfg(unix)]
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;

use famlink_peer::{Client, ClientConfig, PeerError, ReplyMode, Result};
use famlink_schema::Attributes;
use famlink_transport::Datagram;
#[cfg(unix)]
use famlink_transport::BusEndpoint;
use tracing::debug;

use super::handlers::unix_millis;
use super::payload::StructuredPayload;
use super::{demo_family, DemoAttr, DemoCommand};

pub const HELLO_TEXT: &str = "Hello World from client!";

pub const PING_TEXT: &str = "Ping from client!";

pub const CLIENT_NAME: &str = "my_prog_name";

const CLIENT_IPV4: Ipv4Addr = Ipv4Addr::new(123, 45, 67, 89);
const CLIENT_IPV6: Ipv6Addr =
    Ipv6Addr::new(0xabcd, 0xef01, 0x2345, 0x6789, 0x0123, 0x4567, 0x89ab, 0xcdef);

/// Connect to the service at `service_path` and resolve the demo family.
#[cfg(unix)]
pub fn connect(
    service_path: impl AsRef<Path>,
    config: ClientConfig,
) -> Result<Client<BusEndpoint>> {
    Client::connect(service_path, Arc::new(demo_family()?), config)
}

/// Demo client over an already connected endpoint.
pub fn with_endpoint<E: Datagram>(
    endpoint: E,
    port_id: u32,
    config: ClientConfig,
) -> Result<Client<E>> {
    Client::with_endpoint(endpoint, Arc::new(demo_family()?), port_id, config)
}

/// Send a greeting. The service never answers it.
pub fn send_hello<E: Datagram>(client: &mut Client<E>, text: &str) -> Result<u32> {
    let attrs = Attributes::new().with(DemoAttr::HelloMsg, text);
    client.send_request(DemoCommand::Hello, &attrs)
}

/// One ping, one pong.
pub fn pingpong<E: Datagram>(client: &mut Client<E>, text: &str) -> Result<String> {
    let attrs = Attributes::new().with(DemoAttr::PingPongMsg, text);
    let mut pong = None;
    client.request(DemoCommand::PingPong, &attrs, ReplyMode::Single, |reply| {
        pong = Some(reply.attributes.require_str(DemoAttr::PingPongMsg)?.to_owned());
        Ok(())
    })?;
    pong.ok_or_else(|| PeerError::MalformedReply("no pong in reply".into()))
}

/// One ping, a stream of pongs.
pub fn pingpong_random<E: Datagram>(client: &mut Client<E>, text: &str) -> Result<Vec<String>> {
    let attrs = Attributes::new().with(DemoAttr::PingPongRandomMsg, text);
    let mut pongs = Vec::new();
    client.request(
        DemoCommand::PingPongRandom,
        &attrs,
        ReplyMode::Multipart,
        |reply| {
            let pong = reply.attributes.require_str(DemoAttr::PingPongRandomMsg)?;
            debug!(part = pongs.len(), msg = pong, "pong");
            pongs.push(pong.to_owned());
            Ok(())
        },
    )?;
    Ok(pongs)
}

/// Exchange structured payloads with the service.
pub fn request_struct<E: Datagram>(
    client: &mut Client<E>,
    payload: &StructuredPayload,
) -> Result<StructuredPayload> {
    let attrs = Attributes::new().with(DemoAttr::StructMsg, payload.to_bytes());
    let mut answer = None;
    client.request(DemoCommand::Struct, &attrs, ReplyMode::Single, |reply| {
        let blob = reply.attributes.require_binary(DemoAttr::StructMsg)?;
        let decoded = StructuredPayload::decode(blob)
            .map_err(|err| PeerError::MalformedReply(err.to_string()))?;
        answer = Some(decoded);
        Ok(())
    })?;
    answer.ok_or_else(|| PeerError::MalformedReply("no payload in reply".into()))
}

/// The payload a client sends with a `Struct` request.
pub fn client_payload() -> StructuredPayload {
    StructuredPayload::new(
        std::process::id(),
        unix_millis(),
        CLIENT_NAME,
        CLIENT_IPV4,
        CLIENT_IPV6,
    )
}

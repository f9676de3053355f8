//! Service-side handlers of the demo family.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use famlink_peer::{Dispatcher, Result};
use famlink_schema::{Attributes, FamilyRegistry};
use rand::Rng;
use tracing::info;

use super::payload::StructuredPayload;
use super::{DemoAttr, DemoCommand, DEMO_FAMILY_NAME};

/// Upper bound on pongs streamed after the first one.
pub const MAX_EXTRA_PARTS: usize = 10;

pub const PONG_TEXT: &str = "Pong from service!";

pub const SERVICE_NAME: &str = "famlink-service";

const SERVICE_IPV4: Ipv4Addr = Ipv4Addr::new(123, 45, 67, 89);
const SERVICE_IPV6: Ipv6Addr = Ipv6Addr::new(
    0xabcd, 0xef01, 0x2345, 0x6789, 0x0123, 0x4567, 0x89ab, 0xcdef,
);

/// Decides how many extra pongs a `PingPongRandom` request gets.
pub trait CountSource: Send + Sync {
    fn extra_parts(&self) -> usize;
}

/// Uniform draw from `0..=MAX_EXTRA_PARTS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCount;

impl CountSource for RandomCount {
    fn extra_parts(&self) -> usize {
        rand::thread_rng().gen_range(0..=MAX_EXTRA_PARTS)
    }
}

/// Always the same count.
#[derive(Debug, Clone, Copy)]
pub struct FixedCount(pub usize);

impl CountSource for FixedCount {
    fn extra_parts(&self) -> usize {
        self.0
    }
}

/// The payload the service answers `Struct` requests with.
pub fn service_payload() -> StructuredPayload {
    StructuredPayload::new(
        std::process::id(),
        unix_millis(),
        SERVICE_NAME,
        SERVICE_IPV4,
        SERVICE_IPV6,
    )
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Dispatcher serving the demo family registered in `registry`.
pub fn build_dispatcher(
    registry: &FamilyRegistry,
    counts: Arc<dyn CountSource>,
) -> Result<Dispatcher<DemoCommand>> {
    let mut dispatcher = Dispatcher::for_registry(registry, DEMO_FAMILY_NAME)?;

    dispatcher
        .route(DemoCommand::Hello, &[DemoAttr::HelloMsg], |req, _resp| {
            let text = req.attributes.require_str(DemoAttr::HelloMsg)?;
            info!(seq = req.sequence, port = req.source_endpoint, msg = text, "hello");
            Ok(())
        })?
        .route(DemoCommand::PingPong, &[DemoAttr::PingPongMsg], |req, resp| {
            let text = req.attributes.require_str(DemoAttr::PingPongMsg)?;
            info!(seq = req.sequence, msg = text, "ping");
            resp.reply(&Attributes::new().with(DemoAttr::PingPongMsg, PONG_TEXT))
        })?
        .route(
            DemoCommand::PingPongRandom,
            &[DemoAttr::PingPongRandomMsg],
            move |req, resp| {
                let text = req.attributes.require_str(DemoAttr::PingPongRandomMsg)?;
                let extra = counts.extra_parts().min(MAX_EXTRA_PARTS);
                info!(seq = req.sequence, msg = text, pongs = extra + 1, "ping");
                let pong = Attributes::new().with(DemoAttr::PingPongRandomMsg, PONG_TEXT);
                for _ in 0..=extra {
                    resp.part(&pong)?;
                }
                Ok(())
            },
        )?
        .route(DemoCommand::Struct, &[DemoAttr::StructMsg], |req, resp| {
            let blob = req.attributes.require_binary(DemoAttr::StructMsg)?;
            match StructuredPayload::decode(blob) {
                Ok(payload) => info!(seq = req.sequence, %payload, "struct"),
                Err(_) => {
                    let text = String::from_utf8_lossy(blob);
                    info!(seq = req.sequence, msg = %text, "struct");
                }
            }
            resp.reply(
                &Attributes::new().with(DemoAttr::StructMsg, service_payload().to_bytes()),
            )
        })?;

    Ok(dispatcher)
}

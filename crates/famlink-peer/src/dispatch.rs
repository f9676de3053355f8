use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use famlink_frame::Message;
use famlink_schema::{decode_attributes, Attributes, Family, FamilyRegistry, SchemaError};
use tracing::debug;

use crate::error::{PeerError, Result};
use crate::responder::Responder;

/// A decoded request as seen by a handler.
#[derive(Debug, Clone)]
pub struct Request<C> {
    pub command: C,
    pub sequence: u32,
    pub source_endpoint: u32,
    pub attributes: Attributes,
}

type Handler<C> = Box<dyn Fn(&Request<C>, &mut Responder<'_>) -> Result<()> + Send + Sync>;

struct Route<C> {
    required: Vec<u16>,
    handler: Handler<C>,
}

/// Anything that turns a request message into reply messages for one family.
pub trait Dispatch: Send + Sync {
    /// Runtime id of the family served.
    fn family_id(&self) -> u16;

    fn family(&self) -> &Family;

    /// Handle one request. An error means nothing is sent.
    fn dispatch(&self, msg: &Message) -> Result<Vec<Message>>;
}

/// Routes requests of one family to handlers keyed by a closed command enum.
///
/// `C` is the family's command enumeration. Wire values it cannot represent
/// are rejected as [`PeerError::UnknownCommand`] before any handler runs.
pub struct Dispatcher<C> {
    family_id: u16,
    family: Arc<Family>,
    routes: HashMap<u8, Route<C>>,
    _command: PhantomData<fn() -> C>,
}

impl<C> Dispatcher<C>
where
    C: TryFrom<u8> + Into<u8> + Copy + 'static,
{
    pub fn new(family_id: u16, family: Arc<Family>) -> Self {
        Self {
            family_id,
            family,
            routes: HashMap::new(),
            _command: PhantomData,
        }
    }

    /// Dispatcher for the family registered under `name`.
    pub fn for_registry(registry: &FamilyRegistry, name: &str) -> Result<Self> {
        let id = registry
            .resolve(name)
            .map_err(|_| PeerError::UnknownFamily(name.to_owned()))?;
        let family = Arc::clone(registry.family(name)?);
        Ok(Self::new(id, family))
    }

    /// Register `handler` for `command`. The request must carry every key in
    /// `required`, otherwise the handler is not called.
    pub fn route<K, F>(&mut self, command: C, required: &[K], handler: F) -> Result<&mut Self>
    where
        K: Copy + Into<u16>,
        F: Fn(&Request<C>, &mut Responder<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let wire: u8 = command.into();
        if !self.family.accepts(wire) {
            return Err(PeerError::UnknownCommand(wire));
        }
        let required: Vec<u16> = required.iter().map(|key| (*key).into()).collect();
        if let Some(key) = required
            .iter()
            .find(|key| !self.family.policy().contains(**key))
        {
            return Err(SchemaError::UnknownAttribute(*key).into());
        }
        self.routes.insert(
            wire,
            Route {
                required,
                handler: Box::new(handler),
            },
        );
        Ok(self)
    }

    /// Whether a handler is registered for `command`.
    pub fn handles(&self, command: C) -> bool {
        self.routes.contains_key(&command.into())
    }
}

impl<C> Dispatch for Dispatcher<C>
where
    C: TryFrom<u8> + Into<u8> + Copy + 'static,
{
    fn family_id(&self) -> u16 {
        self.family_id
    }

    fn family(&self) -> &Family {
        &self.family
    }

    fn dispatch(&self, msg: &Message) -> Result<Vec<Message>> {
        if msg.family_id != self.family_id {
            return Err(PeerError::UnknownFamily(format!("id {:#06x}", msg.family_id)));
        }
        if !msg.flags.request {
            return Err(PeerError::NotARequest);
        }

        let command =
            C::try_from(msg.command).map_err(|_| PeerError::UnknownCommand(msg.command))?;
        let route = self
            .routes
            .get(&msg.command)
            .ok_or(PeerError::UnknownCommand(msg.command))?;

        let attributes = decode_attributes(&msg.attributes, self.family.policy())?;
        if let Some(key) = route.required.iter().find(|key| !attributes.contains(**key)) {
            return Err(PeerError::MissingAttribute {
                command: msg.command,
                key: *key,
            });
        }

        let request = Request {
            command,
            sequence: msg.sequence,
            source_endpoint: msg.source_endpoint,
            attributes,
        };
        let mut responder = Responder::new(self.family_id, &self.family, msg);
        (route.handler)(&request, &mut responder)?;
        let replies = responder.finish();

        debug!(
            family = self.family.name(),
            command = msg.command,
            seq = msg.sequence,
            replies = replies.len(),
            "request handled"
        );
        Ok(replies)
    }
}

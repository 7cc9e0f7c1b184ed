//! Message router.
//!
//! Binds each [`MessageKind`] to exactly one handler and dispatches raw
//! payloads to it. The router is generic over the context handlers mutate, so
//! it can live next to that context without borrowing it.
//!
//! # Usage
//! ```ignore
//! let mut router = MessageRouter::<NetWorld<SimWorld>>::new();
//! router.bind::<PickupableDestroy, _>(|world, sender, msg| world.on_destroy(sender, msg))?;
//! router.dispatch(&mut world, sender, frame.kind, &frame.payload)?;
//! ```

use std::collections::HashMap;

use networld_shared::{
    ids::PeerId,
    messages::{MessageKind, NetMessage},
};
use tracing::warn;

use crate::error::{Anomaly, Outcome, SyncError};

/// Handler function type, already specialised to decode its payload.
pub type Handler<C> = Box<dyn Fn(&mut C, PeerId, &[u8]) -> Result<Outcome, SyncError>>;

pub struct MessageRouter<C> {
    handlers: HashMap<MessageKind, Handler<C>>,
}

impl<C> Default for MessageRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> MessageRouter<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Binds the handler for `M`. Binding a kind twice is a programming error.
    pub fn bind<M, F>(&mut self, handler: F) -> Result<(), SyncError>
    where
        M: NetMessage,
        F: Fn(&mut C, PeerId, M) -> Result<Outcome, SyncError> + 'static,
    {
        if self.handlers.contains_key(&M::KIND) {
            return Err(SyncError::HandlerAlreadyBound(M::KIND));
        }
        let decode_and_handle = move |ctx: &mut C, sender: PeerId, payload: &[u8]| {
            match serde_json::from_slice::<M>(payload) {
                Ok(msg) => handler(ctx, sender, msg),
                Err(e) => {
                    warn!(kind = ?M::KIND, %sender, error = %e, "Failed to decode payload");
                    Ok(Outcome::Dropped(Anomaly::Malformed(M::KIND)))
                }
            }
        };
        self.handlers.insert(M::KIND, Box::new(decode_and_handle));
        Ok(())
    }

    pub fn is_bound(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Decodes `payload` as the type bound to `kind` and runs its handler.
    pub fn dispatch(
        &self,
        ctx: &mut C,
        sender: PeerId,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<Outcome, SyncError> {
        match self.handlers.get(&kind) {
            Some(handler) => handler(ctx, sender, payload),
            None => Ok(Outcome::Dropped(Anomaly::UnboundKind(kind))),
        }
    }
}

//! Outbound message queue.
//!
//! Handlers and the emitter never talk to the transport directly; they queue
//! frames here and whoever owns the sockets drains the queue after each tick.

use std::collections::VecDeque;

use networld_shared::{
    ids::PeerId,
    messages::{MessageKind, NetMessage},
    net::{Frame, SendFlags},
};
use tracing::{error, trace};

/// Who should receive an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every other participant.
    All,
    /// The session host.
    Host,
    Peer(PeerId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub target: Target,
    pub flags: SendFlags,
    pub frame: Frame,
}

impl Outgoing {
    pub fn kind(&self) -> MessageKind {
        self.frame.kind
    }
}

#[derive(Debug)]
pub struct Outbox {
    sender: PeerId,
    queue: VecDeque<Outgoing>,
}

impl Outbox {
    pub fn new(sender: PeerId) -> Self {
        Self {
            sender,
            queue: VecDeque::new(),
        }
    }

    pub fn push<M: NetMessage>(&mut self, target: Target, msg: &M) {
        match Frame::from_message(self.sender, msg) {
            Ok(frame) => {
                trace!(kind = ?M::KIND, ?target, "Queued message");
                self.queue.push_back(Outgoing {
                    target,
                    flags: M::KIND.send_flags(),
                    frame,
                });
            }
            Err(e) => error!(kind = ?M::KIND, error = %e, "Failed to encode outbound message"),
        }
    }

    pub fn broadcast<M: NetMessage>(&mut self, msg: &M) {
        self.push(Target::All, msg);
    }

    pub fn drain(&mut self) -> Vec<Outgoing> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use networld_shared::{ids::PickupableId, messages::PickupableDestroy};

    #[test]
    fn push_stamps_sender_and_flags() {
        let mut outbox = Outbox::new(PeerId(5));
        outbox.broadcast(&PickupableDestroy { id: PickupableId(2) });

        let out = outbox.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, Target::All);
        assert_eq!(out[0].frame.sender, PeerId(5));
        assert_eq!(out[0].kind(), MessageKind::PickupableDestroy);
        assert!(out[0].flags.contains(SendFlags::RELIABLE));
        assert!(outbox.is_empty());
    }
}

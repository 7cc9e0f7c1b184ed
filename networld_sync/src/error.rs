//! Error tiers.
//!
//! [`SyncError`] is fatal: the engine is in (or about to enter) a state the
//! protocol cannot explain, and the session must stop. [`Anomaly`] is the
//! normal noise of a distributed session (races, stale references, duplicate
//! or reordered messages); the offending message is dropped and the session
//! carries on.

use networld_shared::{
    ids::{ObjectRef, PeerId, PickupableId, VehicleId},
    math::Vec3,
    messages::MessageKind,
};
use thiserror::Error;

/// Invariant violations that abort the current operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("duplicate net id {0}")]
    DuplicatePickupable(PickupableId),

    #[error("object {object} is already registered as pickupable {existing}")]
    ObjectAlreadyRegistered {
        object: ObjectRef,
        existing: PickupableId,
    },

    #[error("pickupable id {0} is outside the replicated range")]
    PickupableIdOutOfRange(PickupableId),

    #[error("out of vehicle pool ({0} vehicles registered)")]
    VehiclePoolExhausted(usize),

    #[error("vehicle {0} does not exist locally")]
    UnknownVehicle(VehicleId),

    #[error("no participant matches peer {0}")]
    UnknownParticipant(PeerId),

    #[error("a handler is already bound for {0:?}")]
    HandlerAlreadyBound(MessageKind),
}

/// Recoverable conditions; the message or event is dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Anomaly {
    #[error("sender {0} is not a registered participant")]
    UnknownParticipant(PeerId),

    #[error("pickupable {0} is not spawned")]
    UnknownPickupable(PickupableId),

    #[error("object {0} is not a replicated pickupable")]
    UnregisteredObject(ObjectRef),

    #[error("object {0} no longer exists in the scene")]
    ObjectGone(ObjectRef),

    #[error("reference to the object of pickupable {0} was lost")]
    LostObject(PickupableId),

    #[error("pickupable {0} is not a container")]
    NotAContainer(PickupableId),

    #[error("vehicle {0} does not exist")]
    UnknownVehicle(VehicleId),

    #[error("no door at {0:?}")]
    DoorNotFound(Vec3),

    #[error("no light switch at {0:?}")]
    LightNotFound(Vec3),

    #[error("pickupable pool exhausted")]
    PickupablePoolExhausted,

    #[error("{0:?} received before the world was synchronized")]
    NotSynchronized(MessageKind),

    #[error("world state requested from a peer that is not the host")]
    NotHost,

    #[error("full world sync received while not waiting for one")]
    UnexpectedWorldSync,

    #[error("no handler bound for {0:?}")]
    UnboundKind(MessageKind),

    #[error("malformed {0:?} payload")]
    Malformed(MessageKind),
}

/// Result of processing one inbound message or local event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    /// Nothing to replicate (redundant transition, non-pickupable object).
    Ignored,
    Dropped(Anomaly),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    pub fn anomaly(&self) -> Option<&Anomaly> {
        match self {
            Outcome::Applied | Outcome::Ignored => None,
            Outcome::Dropped(a) => Some(a),
        }
    }
}

impl From<Anomaly> for Outcome {
    fn from(a: Anomaly) -> Self {
        Outcome::Dropped(a)
    }
}

//! Join handshake.
//!
//! A joiner asks the host for the world, applies the snapshot it gets back,
//! spawns the host's avatar and restores its own spawn state. Until then
//! only the join kinds are accepted; everything else is dropped.
//!
//! ```text
//! Disconnected --begin_join--> AwaitingWorldState --FullWorldSync--> Synchronized
//! ```

use networld_shared::{
    ids::PeerId,
    messages::{AskForWorldState, FullWorldSync, MessageKind},
    services::WorldServices,
};
use tracing::{info, warn};

use crate::{
    error::{Anomaly, Outcome, SyncError},
    outbox::Target,
    world::{NetWorld, SessionRole},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Disconnected,
    AwaitingWorldState,
    Synchronized,
}

/// Notifications for the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// The joiner applied the host's world; gameplay can start.
    WorldLoaded { host: PeerId },
}

#[derive(Debug)]
pub struct JoinProtocol {
    state: JoinState,
    signals: Vec<SessionSignal>,
}

impl JoinProtocol {
    /// Hosts own the world and start synchronized.
    pub fn for_role(role: SessionRole) -> Self {
        let state = match role {
            SessionRole::Host => JoinState::Synchronized,
            SessionRole::Joiner => JoinState::Disconnected,
        };
        Self {
            state,
            signals: Vec::new(),
        }
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    /// Whether an inbound message of `kind` may be dispatched now.
    pub fn accepts(&self, kind: MessageKind) -> bool {
        kind.is_join() || self.state == JoinState::Synchronized
    }

    pub fn drain_signals(&mut self) -> Vec<SessionSignal> {
        std::mem::take(&mut self.signals)
    }

    pub(crate) fn complete(&mut self, host: PeerId) {
        self.state = JoinState::Synchronized;
        self.signals.push(SessionSignal::WorldLoaded { host });
    }
}

impl<W: WorldServices> NetWorld<W> {
    /// Sends the world state request to the host. Returns `false` when there
    /// is nothing to do (host, or a join already in flight).
    pub fn begin_join(&mut self) -> bool {
        if self.role == SessionRole::Host {
            warn!("Host does not join its own session");
            return false;
        }
        if self.join.state != JoinState::Disconnected {
            warn!(state = ?self.join.state, "Join already in progress");
            return false;
        }
        self.join.state = JoinState::AwaitingWorldState;
        self.outbox.push(Target::Host, &AskForWorldState {});
        info!(peer = %self.local_peer, "Requested world state from host");
        true
    }

    /// Drops back to `Disconnected` once the session is gone.
    pub fn leave_session(&mut self) {
        if self.role == SessionRole::Joiner {
            self.join.state = JoinState::Disconnected;
        }
    }

    pub(crate) fn on_ask_for_world_state(&mut self, sender: PeerId, _msg: AskForWorldState) -> Result<Outcome, SyncError> {
        if self.role != SessionRole::Host {
            return Ok(Anomaly::NotHost.into());
        }
        let mut snapshot = self.write_snapshot();
        snapshot.spawn_state = self.services.spawn_state(sender);
        info!(
            requester = %sender,
            pickupables = snapshot.pickupables.len(),
            vehicles = snapshot.vehicles.len(),
            "Sending full world state"
        );
        self.outbox.push(Target::Peer(sender), &snapshot);
        Ok(Outcome::Applied)
    }

    pub(crate) fn on_full_world_sync(&mut self, sender: PeerId, msg: FullWorldSync) -> Result<Outcome, SyncError> {
        if self.join.state != JoinState::AwaitingWorldState {
            return Ok(Anomaly::UnexpectedWorldSync.into());
        }
        if !self.services.has_participant(sender) {
            return Err(SyncError::UnknownParticipant(sender));
        }

        self.apply_snapshot(&msg)?;
        self.services.spawn_avatar(sender);

        let me = self.local_peer;
        let spawn = &msg.spawn_state;
        self.services.teleport_avatar(me, spawn.transform);
        if let Some(vehicle) = spawn.occupied_vehicle {
            if self.vehicles.get(vehicle).is_none() {
                return Err(SyncError::UnknownVehicle(vehicle));
            }
            self.services.enter_vehicle(me, vehicle, spawn.passenger);
        }
        if let Some(held) = spawn.held_object {
            if self.pickupables.contains(held) {
                self.services.pickup_object(me, held);
            } else {
                warn!(pickupable = %held, "Held object missing from world state, not picked up");
            }
        }

        self.join.complete(sender);
        info!(host = %sender, pickupables = self.pickupables.len(), "World synchronized");
        Ok(Outcome::Applied)
    }
}

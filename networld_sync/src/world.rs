//! Replicated world state.
//!
//! `NetWorld` owns the identity registries, the outbound queue, the join
//! state machine and the heartbeat timer, plus the injected collaborators.
//! Its behaviour is split across modules by concern:
//! - `snapshot`: full-world write/apply
//! - `emitter`: local events and heartbeat
//! - `handlers`: incremental inbound messages
//! - `join`: join handshake

use networld_shared::{
    config::SyncConfig,
    ids::{ObjectRef, PeerId, PickupableId, PrefabId},
    messages::{NetMessage, PickupableSpawn},
    services::WorldServices,
    state::ObjectState,
};
use tracing::{debug, info, trace, warn};

use crate::{
    emitter::HeartbeatTimer,
    error::SyncError,
    join::{JoinProtocol, JoinState},
    outbox::Outbox,
    registry::{PickupableRegistry, VehicleRegistry},
};

/// Whether this process is the session host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Host,
    Joiner,
}

pub struct NetWorld<W> {
    pub(crate) services: W,
    pub(crate) vehicles: VehicleRegistry,
    pub(crate) pickupables: PickupableRegistry,
    pub(crate) outbox: Outbox,
    pub(crate) join: JoinProtocol,
    pub(crate) heartbeat: HeartbeatTimer,
    pub(crate) local_peer: PeerId,
    pub(crate) role: SessionRole,
}

impl<W: WorldServices> NetWorld<W> {
    /// Registers the declared vehicles; they keep these ids for the session.
    pub fn new(services: W, cfg: &SyncConfig, role: SessionRole, local_peer: PeerId) -> Result<Self, SyncError> {
        let vehicles = VehicleRegistry::with_kinds(&cfg.vehicle_kinds)?;
        Ok(Self {
            services,
            vehicles,
            pickupables: PickupableRegistry::new(),
            outbox: Outbox::new(local_peer),
            join: JoinProtocol::for_role(role),
            heartbeat: HeartbeatTimer::new(cfg.heartbeat_interval),
            local_peer,
            role,
        })
    }

    pub fn services(&self) -> &W {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut W {
        &mut self.services
    }

    pub fn vehicles(&self) -> &VehicleRegistry {
        &self.vehicles
    }

    pub fn pickupables(&self) -> &PickupableRegistry {
        &self.pickupables
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == SessionRole::Host
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn join_state(&self) -> JoinState {
        self.join.state()
    }

    /// Registers every pickupable already present in the freshly loaded
    /// scene. Scene order is stable, so peers loading the same map agree on
    /// these ids before any snapshot arrives.
    pub fn on_world_load(&mut self) -> Result<usize, SyncError> {
        self.pickupables.clear();
        for object in self.services.collect_pickupables() {
            let Some(state) = self.services.object_state(object) else {
                continue;
            };
            let Some(id) = self.pickupables.allocate_id() else {
                warn!(%object, "Out of pickupables pool while loading world");
                break;
            };
            self.pickupables.register(id, object, state.prefab, state.active)?;
        }
        info!(pickupables = self.pickupables.len(), "World loaded");
        Ok(self.pickupables.len())
    }

    pub fn on_world_unload(&mut self) {
        self.pickupables.clear();
        debug!("World unloaded, pickupables cleared");
    }

    /// Queues `msg` for every participant, unless this joiner is not in a
    /// session yet.
    pub(crate) fn broadcast<M: NetMessage>(&mut self, msg: &M) {
        if self.role == SessionRole::Joiner && self.join.state() == JoinState::Disconnected {
            trace!(kind = ?M::KIND, "Not in a session, message not sent");
            return;
        }
        self.outbox.broadcast(msg);
    }

    /// Idempotent create-or-update used by spawn messages and snapshots.
    ///
    /// Same id and prefab: update in place. Same id, other prefab (or a lost
    /// object): tear the old one down first. Unknown id: instantiate.
    pub fn spawn_pickupable(&mut self, msg: &PickupableSpawn) -> Result<(), SyncError> {
        if !msg.id.is_valid() {
            return Err(SyncError::PickupableIdOutOfRange(msg.id));
        }
        if let Some(existing) = self.pickupables.get(msg.id).copied() {
            match self.services.object_state(existing.object) {
                Some(state) if state.prefab == msg.prefab => {
                    self.services.set_object_active(existing.object, msg.active);
                    self.services.set_object_transform(existing.object, msg.transform);
                    if let Some(data) = &msg.aux_data {
                        self.apply_aux_data(existing.object, msg.prefab, data);
                    }
                    if let Some(rec) = self.pickupables.get_mut(msg.id) {
                        rec.active = msg.active;
                    }
                    return Ok(());
                }
                Some(state) => {
                    debug!(
                        pickupable = %msg.id,
                        old_prefab = %state.prefab,
                        new_prefab = %msg.prefab,
                        "Replacing pickupable of a different prefab"
                    );
                }
                None => {
                    debug!(pickupable = %msg.id, "Replacing pickupable whose object was lost");
                }
            }
            self.destroy_pickupable_local(msg.id);
        }

        let object = self.services.spawn_object(msg.prefab, msg.transform);
        if !msg.active {
            self.services.set_object_active(object, false);
        }
        if let Some(data) = &msg.aux_data {
            self.apply_aux_data(object, msg.prefab, data);
        }
        self.pickupables.register(msg.id, object, msg.prefab, msg.active)
    }

    /// Removes the id and its scene object without telling anyone.
    pub(crate) fn destroy_pickupable_local(&mut self, id: PickupableId) -> bool {
        match self.pickupables.unregister(id) {
            Some(rec) => {
                self.services.destroy_object(rec.object);
                true
            }
            None => false,
        }
    }

    /// Spawn message describing a registered pickupable as it is now.
    pub(crate) fn spawn_message(&self, id: PickupableId, object: ObjectRef, state: &ObjectState) -> PickupableSpawn {
        PickupableSpawn {
            id,
            prefab: state.prefab,
            transform: state.transform,
            active: state.active,
            aux_data: self.aux_data(object, state.prefab),
        }
    }

    /// Prefab-specific payload: containers report their remaining units.
    pub(crate) fn aux_data(&self, object: ObjectRef, prefab: PrefabId) -> Option<Vec<f32>> {
        match self.services.prefab_type(prefab) {
            Some(kind) if kind.has_aux_data() => self
                .services
                .container_units(object)
                .map(|units| vec![units as f32]),
            _ => None,
        }
    }

    fn apply_aux_data(&mut self, object: ObjectRef, prefab: PrefabId, data: &[f32]) {
        match (self.services.prefab_type(prefab), data.first()) {
            (Some(kind), Some(units)) if kind.has_aux_data() => {
                self.services.set_container_units(object, units.max(0.0) as u32);
            }
            _ => trace!(%object, %prefab, "Ignoring aux data"),
        }
    }
}

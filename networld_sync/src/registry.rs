//! Entity identity registry.
//!
//! Vehicles get ids `0..N` in declared order at startup and keep them for the
//! whole session, so every participant agrees without negotiation.
//! Pickupables draw from a bounded pool using lowest-free-id allocation; only
//! the spawner allocates, receivers register the id they were told.

use std::collections::{BTreeMap, HashMap};

use networld_shared::{
    ids::{ObjectRef, PickupableId, PrefabId, VehicleId},
    state::EngineState,
};
use tracing::debug;

use crate::error::SyncError;

/// Maximum count of supported vehicles.
pub const MAX_VEHICLES: usize = u8::MAX as usize;

/// Maximum count of concurrently live pickupables.
pub const MAX_PICKUPABLES: usize = u16::MAX as usize;

/// Replicated vehicle record. The physical body lives in the scene; this
/// mirrors the network-visible state.
#[derive(Debug, Clone, PartialEq)]
pub struct NetVehicle {
    pub id: VehicleId,
    /// Declared kind; also the key of the body in the scene.
    pub kind: String,
    pub engine_state: EngineState,
    pub dash_state: i32,
    pub switches: BTreeMap<u8, SwitchValue>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchValue {
    pub on: bool,
    pub value: Option<f32>,
}

/// Fixed, ordered set of vehicles.
#[derive(Debug, Default)]
pub struct VehicleRegistry {
    vehicles: Vec<NetVehicle>,
}

impl VehicleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every kind in order.
    pub fn with_kinds<S: AsRef<str>>(kinds: &[S]) -> Result<Self, SyncError> {
        let mut registry = Self::new();
        for kind in kinds {
            registry.register(kind.as_ref())?;
        }
        Ok(registry)
    }

    /// Appends the next vehicle. Startup only.
    pub fn register(&mut self, kind: &str) -> Result<VehicleId, SyncError> {
        if self.vehicles.len() >= MAX_VEHICLES {
            return Err(SyncError::VehiclePoolExhausted(self.vehicles.len()));
        }
        let id = VehicleId(self.vehicles.len() as u8);
        self.vehicles.push(NetVehicle {
            id,
            kind: kind.to_string(),
            engine_state: EngineState::Off,
            dash_state: 0,
            switches: BTreeMap::new(),
        });
        debug!(vehicle = %id, kind, "Registered vehicle");
        Ok(id)
    }

    pub fn get(&self, id: VehicleId) -> Option<&NetVehicle> {
        self.vehicles.get(id.index())
    }

    pub fn get_mut(&mut self, id: VehicleId) -> Option<&mut NetVehicle> {
        self.vehicles.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetVehicle> {
        self.vehicles.iter()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

/// Live pickupable record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetPickupable {
    pub id: PickupableId,
    pub object: ObjectRef,
    pub prefab: PrefabId,
    /// Last activation state replicated for this id.
    pub active: bool,
}

/// Dynamic pickupable pool with a reverse index from scene object to id.
#[derive(Debug, Default)]
pub struct PickupableRegistry {
    entries: BTreeMap<PickupableId, NetPickupable>,
    by_object: HashMap<ObjectRef, PickupableId>,
}

impl PickupableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest id not currently registered, or `None` when the pool is full.
    pub fn allocate_id(&self) -> Option<PickupableId> {
        let mut candidate: usize = 0;
        for id in self.entries.keys() {
            if id.0 as usize != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate >= MAX_PICKUPABLES {
            None
        } else {
            Some(PickupableId(candidate as u16))
        }
    }

    pub fn register(
        &mut self,
        id: PickupableId,
        object: ObjectRef,
        prefab: PrefabId,
        active: bool,
    ) -> Result<(), SyncError> {
        if !id.is_valid() {
            return Err(SyncError::PickupableIdOutOfRange(id));
        }
        if self.entries.contains_key(&id) {
            return Err(SyncError::DuplicatePickupable(id));
        }
        if let Some(existing) = self.by_object.get(&object) {
            return Err(SyncError::ObjectAlreadyRegistered {
                object,
                existing: *existing,
            });
        }
        self.entries.insert(
            id,
            NetPickupable {
                id,
                object,
                prefab,
                active,
            },
        );
        self.by_object.insert(object, id);
        debug!(pickupable = %id, %object, %prefab, "Registered pickupable");
        Ok(())
    }

    /// Idempotent; returns the removed record, if any.
    pub fn unregister(&mut self, id: PickupableId) -> Option<NetPickupable> {
        let removed = self.entries.remove(&id)?;
        self.by_object.remove(&removed.object);
        Some(removed)
    }

    pub fn find_by_object(&self, object: ObjectRef) -> Option<PickupableId> {
        self.by_object.get(&object).copied()
    }

    pub fn get(&self, id: PickupableId) -> Option<&NetPickupable> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: PickupableId) -> Option<&mut NetPickupable> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: PickupableId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<PickupableId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetPickupable> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_object.clear();
    }
}

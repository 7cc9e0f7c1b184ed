//! Collaborator interfaces consumed by the sync engine.
//!
//! The engine never reaches into global state: every scene, fixture,
//! environment, vehicle and participant operation goes through one of these
//! traits, implemented by whatever hosts the simulation.

use crate::{
    ids::{ObjectRef, PeerId, PickupableId, PrefabId, VehicleId},
    math::{Transform, Vec3},
    messages::{PlayerSync, VehicleSync},
    state::{DoorState, EngineState, LightState, ObjectState, PrefabType, SpawnState, Weather, WorldGlobalState},
};

/// Spawnable scene objects and their prefab catalogue.
pub trait SceneObjects {
    /// Instantiates a prefab. Does not report a local spawn event.
    fn spawn_object(&mut self, prefab: PrefabId, transform: Transform) -> ObjectRef;

    /// Destroys an object. Does not report a local destroy event.
    fn destroy_object(&mut self, object: ObjectRef);

    /// `None` once the reference has been lost.
    fn object_state(&self, object: ObjectRef) -> Option<ObjectState>;

    fn set_object_active(&mut self, object: ObjectRef, active: bool);

    fn set_object_transform(&mut self, object: ObjectRef, transform: Transform);

    fn set_object_position(&mut self, object: ObjectRef, position: Vec3);

    /// `None` for prefabs that are not replicated pickupables.
    fn prefab_type(&self, prefab: PrefabId) -> Option<PrefabType>;

    /// Every pickupable currently present, in stable scene order.
    fn collect_pickupables(&self) -> Vec<ObjectRef>;

    /// Remaining units of a container object.
    fn container_units(&self, object: ObjectRef) -> Option<u32>;

    fn set_container_units(&mut self, object: ObjectRef, units: u32);

    /// Returns `false` if the object is not a container.
    fn remove_container_units(&mut self, object: ObjectRef, units: u32) -> bool;
}

/// Doors and light switches, addressed by world position.
pub trait Fixtures {
    fn doors(&self) -> Vec<DoorState>;

    fn door_open(&self, position: Vec3) -> Option<bool>;

    /// Returns `false` if no door is at `position`.
    fn set_door_open(&mut self, position: Vec3, open: bool) -> bool;

    fn lights(&self) -> Vec<LightState>;

    fn light_on(&self, position: Vec3) -> Option<bool>;

    /// Returns `false` if no light switch is at `position`.
    fn set_light_on(&mut self, position: Vec3, on: bool) -> bool;
}

/// Time, day, weather and mailbox name.
pub trait Environment {
    fn global_state(&self) -> WorldGlobalState;

    fn set_time_of_day(&mut self, hours: f32);

    fn set_day(&mut self, day: i32);

    fn set_player_display_name(&mut self, name: &str);

    fn set_weather(&mut self, weather: Weather);
}

/// Physical vehicle bodies, addressed by their declared kind name.
pub trait VehicleBodies {
    fn vehicle_transform(&self, kind: &str) -> Option<Transform>;

    fn teleport_vehicle(&mut self, kind: &str, transform: Transform);

    fn set_engine_state(&mut self, kind: &str, state: EngineState, dash_state: i32, start_time: Option<f32>);

    fn set_vehicle_switch(&mut self, kind: &str, switch_id: u8, value: bool, float_value: Option<f32>);

    /// Per-vehicle physics reconciliation, once per fixed step.
    fn fixed_update(&mut self, kind: &str, dt: f32);
}

/// Session participants (avatars) keyed by peer id.
pub trait Participants {
    fn has_participant(&self, peer: PeerId) -> bool;

    /// Connected participants other than the local one.
    fn remote_participant_count(&self) -> usize;

    fn spawn_avatar(&mut self, peer: PeerId);

    fn teleport_avatar(&mut self, peer: PeerId, transform: Transform);

    fn enter_vehicle(&mut self, peer: PeerId, vehicle: VehicleId, passenger: bool);

    fn leave_vehicle(&mut self, peer: PeerId);

    fn pickup_object(&mut self, peer: PeerId, object: PickupableId);

    fn release_object(&mut self, peer: PeerId, drop: bool);

    fn apply_player_sync(&mut self, peer: PeerId, sync: &PlayerSync);

    fn apply_vehicle_sync(&mut self, peer: PeerId, sync: &VehicleSync);

    /// Last known spawn state of a participant, as seen locally.
    fn spawn_state(&self, peer: PeerId) -> SpawnState;
}

/// Everything the sync engine needs from its surroundings.
pub trait WorldServices: SceneObjects + Fixtures + Environment + VehicleBodies + Participants {}

impl<T> WorldServices for T where T: SceneObjects + Fixtures + Environment + VehicleBodies + Participants {}

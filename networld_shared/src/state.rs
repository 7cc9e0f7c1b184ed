//! Plain world-state values shared by the wire messages and the collaborator
//! traits.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{PickupableId, PrefabId, VehicleId},
    math::{Transform, Vec3},
};

/// Weather system preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WeatherKind {
    #[default]
    Sunny,
    Cloudy,
    Rain,
    Thunder,
}

/// Full weather state as replicated between peers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Weather {
    pub kind: WeatherKind,
    /// Position of the cloud system relative to the map origin.
    pub offset: Vec3,
    /// Heading of the cloud system in degrees.
    pub rotation: f32,
}

/// Session-wide global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldGlobalState {
    /// Hours, `0.0..24.0`.
    pub time_of_day: f32,
    pub day: i32,
    pub weather: Weather,
    /// Name written on the player's mailbox.
    pub player_display_name: String,
}

impl Default for WorldGlobalState {
    fn default() -> Self {
        Self {
            time_of_day: 14.0,
            day: 1,
            weather: Weather::default(),
            player_display_name: String::new(),
        }
    }
}

/// A door fixture, addressed by its world position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoorState {
    pub position: Vec3,
    pub open: bool,
}

/// A light switch fixture, addressed by its world position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    pub position: Vec3,
    pub on: bool,
}

/// Vehicle engine state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EngineState {
    #[default]
    Off,
    Ignition,
    Starting,
    Running,
    Stalled,
}

/// Template family of a pickupable prefab. Drives which auxiliary data the
/// prefab carries on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrefabType {
    Generic,
    /// Container of bottles; aux data is `[remaining_units]`.
    BeerCase,
}

impl PrefabType {
    pub fn has_aux_data(&self) -> bool {
        matches!(self, PrefabType::BeerCase)
    }
}

/// Scene-side view of a spawned object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectState {
    pub prefab: PrefabId,
    pub transform: Transform,
    pub active: bool,
}

/// Where a participant stands when (re)entering the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SpawnState {
    pub transform: Transform,
    pub occupied_vehicle: Option<VehicleId>,
    pub passenger: bool,
    pub held_object: Option<PickupableId>,
}

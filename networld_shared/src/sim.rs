//! In-memory world.
//!
//! `SimWorld` implements every collaborator trait over plain collections. It
//! backs the `peer` binary and the integration tests, and exposes local
//! action helpers (`*_local`) that mutate the scene and report the matching
//! [`LocalEvent`] the way a real scene hook would.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::{
    event::{LocalEvent, LocalEventSender, Space},
    ids::{ObjectRef, PeerId, PickupableId, PrefabId, VehicleId},
    math::{Quat, Transform, Vec3},
    messages::{PlayerSync, VehicleSync},
    services::{Environment, Fixtures, Participants, SceneObjects, VehicleBodies},
    state::{
        DoorState, EngineState, LightState, ObjectState, PrefabType, SpawnState, Weather,
        WorldGlobalState,
    },
};

/// Bottles in a full beer case.
pub const FULL_CASE_UNITS: u32 = 24;

pub const PREFAB_BEER_CASE: PrefabId = PrefabId(0);
pub const PREFAB_BOTTLE: PrefabId = PrefabId(1);
pub const PREFAB_TOOL: PrefabId = PrefabId(2);
pub const PREFAB_SAUSAGES: PrefabId = PrefabId(3);

/// Prefab catalogue entry.
#[derive(Debug, Clone)]
pub struct PrefabDesc {
    pub name: String,
    pub kind: PrefabType,
}

#[derive(Debug, Clone)]
struct SimObject {
    prefab: PrefabId,
    transform: Transform,
    active: bool,
    units: Option<u32>,
}

/// Observable state of a simulated vehicle.
#[derive(Debug, Clone, Default)]
pub struct SimVehicle {
    pub transform: Transform,
    pub engine: EngineState,
    pub dash_state: i32,
    pub start_time: Option<f32>,
    pub switches: BTreeMap<u8, (bool, Option<f32>)>,
    pub fixed_steps: u64,
}

/// Observable state of a participant avatar.
#[derive(Debug, Clone, Default)]
pub struct SimPlayer {
    pub spawned: bool,
    pub state: SpawnState,
    pub last_sync: Option<PlayerSync>,
    pub last_vehicle_sync: Option<VehicleSync>,
}

/// In-memory implementation of every world collaborator.
#[derive(Debug)]
pub struct SimWorld {
    local_peer: PeerId,
    next_object: u64,
    objects: BTreeMap<ObjectRef, SimObject>,
    prefabs: HashMap<PrefabId, PrefabDesc>,
    doors: Vec<DoorState>,
    lights: Vec<LightState>,
    global: WorldGlobalState,
    vehicles: HashMap<String, SimVehicle>,
    players: HashMap<PeerId, SimPlayer>,
    events: Option<LocalEventSender>,
}

impl SimWorld {
    /// Empty world containing only the local participant.
    pub fn new(local_peer: PeerId) -> Self {
        let mut players = HashMap::new();
        players.insert(local_peer, SimPlayer::default());
        Self {
            local_peer,
            next_object: 1,
            objects: BTreeMap::new(),
            prefabs: HashMap::new(),
            doors: Vec::new(),
            lights: Vec::new(),
            global: WorldGlobalState::default(),
            vehicles: HashMap::new(),
            players,
            events: None,
        }
    }

    /// The stock map: prefab catalogue, farm house fixtures and one body per
    /// declared vehicle kind.
    pub fn standard(local_peer: PeerId, vehicle_kinds: &[String]) -> Self {
        let mut world = Self::new(local_peer)
            .with_prefab(PREFAB_BEER_CASE, "beer case", PrefabType::BeerCase)
            .with_prefab(PREFAB_BOTTLE, "bottle", PrefabType::Generic)
            .with_prefab(PREFAB_TOOL, "tool", PrefabType::Generic)
            .with_prefab(PREFAB_SAUSAGES, "sausages", PrefabType::Generic)
            .with_door(Vec3::new(-10.2, 0.5, 8.0), false)
            .with_door(Vec3::new(-12.8, 0.5, 3.1), false)
            .with_door(Vec3::new(-7.4, 0.5, 14.6), true)
            .with_light(Vec3::new(-11.0, 1.4, 7.6), false)
            .with_light(Vec3::new(-13.2, 1.4, 2.2), true);
        for (i, kind) in vehicle_kinds.iter().enumerate() {
            let spot = Vec3::new(5.0 * i as f32, 0.0, -20.0);
            world = world.with_vehicle(kind, Transform::at(spot));
        }
        world
    }

    pub fn with_prefab(mut self, id: PrefabId, name: &str, kind: PrefabType) -> Self {
        self.prefabs.insert(
            id,
            PrefabDesc {
                name: name.to_string(),
                kind,
            },
        );
        self
    }

    pub fn with_door(mut self, position: Vec3, open: bool) -> Self {
        self.doors.push(DoorState { position, open });
        self
    }

    pub fn with_light(mut self, position: Vec3, on: bool) -> Self {
        self.lights.push(LightState { position, on });
        self
    }

    pub fn with_vehicle(mut self, kind: &str, transform: Transform) -> Self {
        self.vehicles.insert(
            kind.to_string(),
            SimVehicle {
                transform,
                ..Default::default()
            },
        );
        self
    }

    /// Routes local action helpers into the engine's event channel.
    pub fn attach_events(&mut self, events: LocalEventSender) {
        self.events = Some(events);
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    fn report(&self, event: LocalEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    // ─── Participants ───

    pub fn add_participant(&mut self, peer: PeerId) {
        self.players.entry(peer).or_default();
    }

    pub fn remove_participant(&mut self, peer: PeerId) {
        if peer != self.local_peer {
            self.players.remove(&peer);
        }
    }

    pub fn player(&self, peer: PeerId) -> Option<&SimPlayer> {
        self.players.get(&peer)
    }

    // ─── Inspection ───

    pub fn prefab(&self, id: PrefabId) -> Option<&PrefabDesc> {
        self.prefabs.get(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn objects_of_prefab(&self, prefab: PrefabId) -> Vec<ObjectRef> {
        self.objects
            .iter()
            .filter(|(_, o)| o.prefab == prefab)
            .map(|(r, _)| *r)
            .collect()
    }

    pub fn vehicle(&self, kind: &str) -> Option<&SimVehicle> {
        self.vehicles.get(kind)
    }

    /// Drops an object without reporting it, as when the scene loses a
    /// reference behind the engine's back.
    pub fn lose_object(&mut self, object: ObjectRef) {
        self.objects.remove(&object);
    }

    /// Places an object without reporting a spawn (world-load content).
    pub fn place_object(&mut self, prefab: PrefabId, transform: Transform) -> ObjectRef {
        self.spawn_object(prefab, transform)
    }

    /// Advances the world clock, rolling over to the next day.
    pub fn advance_clock(&mut self, hours: f32) {
        self.global.time_of_day += hours;
        while self.global.time_of_day >= 24.0 {
            self.global.time_of_day -= 24.0;
            self.global.day += 1;
        }
    }

    // ─── Local actions ───

    pub fn spawn_local(&mut self, prefab: PrefabId, transform: Transform) -> ObjectRef {
        let object = self.spawn_object(prefab, transform);
        self.report(LocalEvent::ObjectSpawned { object });
        object
    }

    pub fn destroy_local(&mut self, object: ObjectRef) {
        self.objects.remove(&object);
        self.report(LocalEvent::ObjectDestroyed { object });
    }

    pub fn set_active_local(&mut self, object: ObjectRef, active: bool) {
        self.set_object_active(object, active);
        self.report(LocalEvent::ObjectActivation {
            object,
            activate: active,
        });
    }

    pub fn move_local(&mut self, object: ObjectRef, position: Vec3, space: Space) {
        let target = match space {
            Space::World => position,
            Space::Local { origin } => origin + position,
        };
        self.set_object_position(object, target);
        self.report(LocalEvent::ObjectPositionSet {
            object,
            position,
            space,
        });
    }

    pub fn open_door_local(&mut self, position: Vec3, open: bool) {
        if self.set_door_open(position, open) {
            self.report(LocalEvent::DoorToggled { position, open });
        }
    }

    pub fn toggle_light_local(&mut self, position: Vec3, on: bool) {
        if self.set_light_on(position, on) {
            self.report(LocalEvent::LightToggled { position, on });
        }
    }

    pub fn consume_bottle_local(&mut self, object: ObjectRef) {
        if self.remove_container_units(object, 1) {
            self.report(LocalEvent::BottleConsumed { object });
        }
    }

    pub fn enter_vehicle_local(&mut self, vehicle: VehicleId, passenger: bool) {
        let me = self.local_peer;
        self.enter_vehicle(me, vehicle, passenger);
        self.report(LocalEvent::VehicleEntered { vehicle, passenger });
    }

    pub fn leave_vehicle_local(&mut self) {
        let me = self.local_peer;
        self.leave_vehicle(me);
        self.report(LocalEvent::VehicleLeft);
    }
}

impl SceneObjects for SimWorld {
    fn spawn_object(&mut self, prefab: PrefabId, transform: Transform) -> ObjectRef {
        let object = ObjectRef(self.next_object);
        self.next_object += 1;
        let units = match self.prefab_type(prefab) {
            Some(PrefabType::BeerCase) => Some(FULL_CASE_UNITS),
            _ => None,
        };
        self.objects.insert(
            object,
            SimObject {
                prefab,
                transform,
                active: true,
                units,
            },
        );
        debug!(%object, %prefab, "Spawned scene object");
        object
    }

    fn destroy_object(&mut self, object: ObjectRef) {
        self.objects.remove(&object);
    }

    fn object_state(&self, object: ObjectRef) -> Option<ObjectState> {
        self.objects.get(&object).map(|o| ObjectState {
            prefab: o.prefab,
            transform: o.transform,
            active: o.active,
        })
    }

    fn set_object_active(&mut self, object: ObjectRef, active: bool) {
        if let Some(o) = self.objects.get_mut(&object) {
            o.active = active;
        }
    }

    fn set_object_transform(&mut self, object: ObjectRef, transform: Transform) {
        if let Some(o) = self.objects.get_mut(&object) {
            o.transform = transform;
        }
    }

    fn set_object_position(&mut self, object: ObjectRef, position: Vec3) {
        if let Some(o) = self.objects.get_mut(&object) {
            o.transform.position = position;
        }
    }

    fn prefab_type(&self, prefab: PrefabId) -> Option<PrefabType> {
        self.prefabs.get(&prefab).map(|p| p.kind)
    }

    fn collect_pickupables(&self) -> Vec<ObjectRef> {
        self.objects
            .iter()
            .filter(|(_, o)| self.prefabs.contains_key(&o.prefab))
            .map(|(r, _)| *r)
            .collect()
    }

    fn container_units(&self, object: ObjectRef) -> Option<u32> {
        self.objects.get(&object).and_then(|o| o.units)
    }

    fn set_container_units(&mut self, object: ObjectRef, units: u32) {
        if let Some(o) = self.objects.get_mut(&object) {
            if o.units.is_some() {
                o.units = Some(units.min(FULL_CASE_UNITS));
            }
        }
    }

    fn remove_container_units(&mut self, object: ObjectRef, units: u32) -> bool {
        match self.objects.get_mut(&object).and_then(|o| o.units.as_mut()) {
            Some(left) => {
                *left = left.saturating_sub(units);
                true
            }
            None => false,
        }
    }
}

impl Fixtures for SimWorld {
    fn doors(&self) -> Vec<DoorState> {
        self.doors.clone()
    }

    fn door_open(&self, position: Vec3) -> Option<bool> {
        self.doors
            .iter()
            .find(|d| d.position.approx_eq(position))
            .map(|d| d.open)
    }

    fn set_door_open(&mut self, position: Vec3, open: bool) -> bool {
        match self.doors.iter_mut().find(|d| d.position.approx_eq(position)) {
            Some(door) => {
                door.open = open;
                true
            }
            None => false,
        }
    }

    fn lights(&self) -> Vec<LightState> {
        self.lights.clone()
    }

    fn light_on(&self, position: Vec3) -> Option<bool> {
        self.lights
            .iter()
            .find(|l| l.position.approx_eq(position))
            .map(|l| l.on)
    }

    fn set_light_on(&mut self, position: Vec3, on: bool) -> bool {
        match self.lights.iter_mut().find(|l| l.position.approx_eq(position)) {
            Some(light) => {
                light.on = on;
                true
            }
            None => false,
        }
    }
}

impl Environment for SimWorld {
    fn global_state(&self) -> WorldGlobalState {
        self.global.clone()
    }

    fn set_time_of_day(&mut self, hours: f32) {
        self.global.time_of_day = hours.rem_euclid(24.0);
    }

    fn set_day(&mut self, day: i32) {
        self.global.day = day;
    }

    fn set_player_display_name(&mut self, name: &str) {
        self.global.player_display_name = name.to_string();
    }

    fn set_weather(&mut self, weather: Weather) {
        self.global.weather = weather;
    }
}

impl VehicleBodies for SimWorld {
    fn vehicle_transform(&self, kind: &str) -> Option<Transform> {
        self.vehicles.get(kind).map(|v| v.transform)
    }

    fn teleport_vehicle(&mut self, kind: &str, transform: Transform) {
        if let Some(v) = self.vehicles.get_mut(kind) {
            v.transform = transform;
        }
    }

    fn set_engine_state(&mut self, kind: &str, state: EngineState, dash_state: i32, start_time: Option<f32>) {
        if let Some(v) = self.vehicles.get_mut(kind) {
            v.engine = state;
            v.dash_state = dash_state;
            v.start_time = start_time;
        }
    }

    fn set_vehicle_switch(&mut self, kind: &str, switch_id: u8, value: bool, float_value: Option<f32>) {
        if let Some(v) = self.vehicles.get_mut(kind) {
            v.switches.insert(switch_id, (value, float_value));
        }
    }

    fn fixed_update(&mut self, kind: &str, _dt: f32) {
        if let Some(v) = self.vehicles.get_mut(kind) {
            v.fixed_steps += 1;
        }
    }
}

impl Participants for SimWorld {
    fn has_participant(&self, peer: PeerId) -> bool {
        self.players.contains_key(&peer)
    }

    fn remote_participant_count(&self) -> usize {
        self.players.keys().filter(|p| **p != self.local_peer).count()
    }

    fn spawn_avatar(&mut self, peer: PeerId) {
        if let Some(p) = self.players.get_mut(&peer) {
            p.spawned = true;
        }
    }

    fn teleport_avatar(&mut self, peer: PeerId, transform: Transform) {
        if let Some(p) = self.players.get_mut(&peer) {
            p.state.transform = transform;
        }
    }

    fn enter_vehicle(&mut self, peer: PeerId, vehicle: VehicleId, passenger: bool) {
        if let Some(p) = self.players.get_mut(&peer) {
            p.state.occupied_vehicle = Some(vehicle);
            p.state.passenger = passenger;
        }
    }

    fn leave_vehicle(&mut self, peer: PeerId) {
        if let Some(p) = self.players.get_mut(&peer) {
            p.state.occupied_vehicle = None;
            p.state.passenger = false;
        }
    }

    fn pickup_object(&mut self, peer: PeerId, object: PickupableId) {
        if let Some(p) = self.players.get_mut(&peer) {
            p.state.held_object = Some(object);
        }
    }

    fn release_object(&mut self, peer: PeerId, _drop: bool) {
        if let Some(p) = self.players.get_mut(&peer) {
            p.state.held_object = None;
        }
    }

    fn apply_player_sync(&mut self, peer: PeerId, sync: &PlayerSync) {
        if let Some(p) = self.players.get_mut(&peer) {
            p.state.transform = sync.transform;
            p.last_sync = Some(sync.clone());
        }
    }

    fn apply_vehicle_sync(&mut self, peer: PeerId, sync: &VehicleSync) {
        if let Some(p) = self.players.get_mut(&peer) {
            p.last_vehicle_sync = Some(sync.clone());
        }
    }

    fn spawn_state(&self, peer: PeerId) -> SpawnState {
        self.players
            .get(&peer)
            .map(|p| p.state)
            .unwrap_or(SpawnState {
                transform: Transform::new(Vec3::new(-9.0, 0.5, 10.0), Quat::IDENTITY),
                ..Default::default()
            })
    }
}

//! Full-world snapshot codec.
//!
//! Writing reads every replicated fact through the collaborators. Applying
//! is differential: a value is only written when it differs from local
//! state, pickupables go through the idempotent spawn path, and pickupables
//! the snapshot does not mention are collected unless still active locally.

use std::collections::BTreeSet;

use networld_shared::{
    messages::{FullWorldSync, PickupableSpawn, VehicleInit},
    services::WorldServices,
    state::SpawnState,
};
use tracing::{debug, warn};

use crate::{
    error::{Anomaly, SyncError},
    world::NetWorld,
};

impl<W: WorldServices> NetWorld<W> {
    /// Captures the world as seen locally. `spawn_state` is left at its
    /// default; the join handler fills it in per requester.
    pub fn write_snapshot(&self) -> FullWorldSync {
        let global = self.services.global_state();

        let mut vehicles = Vec::with_capacity(self.vehicles.len());
        for vehicle in self.vehicles.iter() {
            match self.services.vehicle_transform(&vehicle.kind) {
                Some(transform) => vehicles.push(VehicleInit {
                    id: vehicle.id,
                    transform,
                }),
                None => warn!(vehicle = %vehicle.id, kind = %vehicle.kind, "Vehicle body missing, not written"),
            }
        }

        let mut pickupables = Vec::with_capacity(self.pickupables.len());
        for rec in self.pickupables.iter() {
            let Some(state) = self.services.object_state(rec.object) else {
                warn!(pickupable = %rec.id, "Lost object reference, not written");
                continue;
            };
            pickupables.push(PickupableSpawn {
                id: rec.id,
                prefab: state.prefab,
                transform: state.transform,
                active: state.active,
                aux_data: self.aux_data(rec.object, state.prefab),
            });
        }

        FullWorldSync {
            day_time: global.time_of_day,
            day: global.day,
            mailbox_name: global.player_display_name,
            doors: self.services.doors(),
            lights: self.services.lights(),
            weather: global.weather,
            vehicles,
            pickupables,
            spawn_state: SpawnState::default(),
        }
    }

    /// Reconciles local state with `snapshot`. Applying the same snapshot
    /// twice leaves the world as after the first application.
    pub fn apply_snapshot(&mut self, snapshot: &FullWorldSync) -> Result<(), SyncError> {
        let current = self.services.global_state();
        if current.time_of_day != snapshot.day_time {
            self.services.set_time_of_day(snapshot.day_time);
        }
        if current.day != snapshot.day {
            self.services.set_day(snapshot.day);
        }
        if current.player_display_name != snapshot.mailbox_name {
            self.services.set_player_display_name(&snapshot.mailbox_name);
        }
        if current.weather != snapshot.weather {
            self.services.set_weather(snapshot.weather);
        }

        for door in &snapshot.doors {
            match self.services.door_open(door.position) {
                Some(open) if open != door.open => {
                    self.services.set_door_open(door.position, door.open);
                }
                Some(_) => {}
                None => warn!(anomaly = %Anomaly::DoorNotFound(door.position), "Skipping door"),
            }
        }

        for light in &snapshot.lights {
            match self.services.light_on(light.position) {
                Some(on) if on != light.on => {
                    self.services.set_light_on(light.position, light.on);
                }
                Some(_) => {}
                None => warn!(anomaly = %Anomaly::LightNotFound(light.position), "Skipping light switch"),
            }
        }

        for init in &snapshot.vehicles {
            let vehicle = self
                .vehicles
                .get(init.id)
                .ok_or(SyncError::UnknownVehicle(init.id))?;
            self.services.teleport_vehicle(&vehicle.kind, init.transform);
        }

        let mut stale: BTreeSet<_> = self.pickupables.ids().into_iter().collect();
        for spawn in &snapshot.pickupables {
            self.spawn_pickupable(spawn)?;
            stale.remove(&spawn.id);
        }

        for id in stale {
            let still_active = self
                .pickupables
                .get(id)
                .and_then(|rec| self.services.object_state(rec.object))
                .is_some_and(|state| state.active);
            if still_active {
                debug!(pickupable = %id, "Keeping active pickupable absent from snapshot");
                continue;
            }
            debug!(pickupable = %id, "Collecting pickupable absent from snapshot");
            self.destroy_pickupable_local(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use networld_shared::{
        config::SyncConfig,
        ids::{PeerId, PickupableId, VehicleId},
        math::{Transform, Vec3},
        services::{Environment, Fixtures, SceneObjects, VehicleBodies},
        sim::{SimWorld, FULL_CASE_UNITS, PREFAB_BEER_CASE, PREFAB_BOTTLE, PREFAB_TOOL},
        state::WeatherKind,
    };

    use super::*;
    use crate::world::SessionRole;

    fn world(peer: u64, role: SessionRole) -> NetWorld<SimWorld> {
        let cfg = SyncConfig::default();
        let sim = SimWorld::standard(PeerId(peer), &cfg.vehicle_kinds);
        NetWorld::new(sim, &cfg, role, PeerId(peer)).unwrap()
    }

    fn populated_host() -> NetWorld<SimWorld> {
        let mut host = world(1, SessionRole::Host);
        let sim = host.services_mut();
        sim.place_object(PREFAB_BOTTLE, Transform::at(Vec3::new(1.0, 0.0, 0.0)));
        let case = sim.place_object(PREFAB_BEER_CASE, Transform::at(Vec3::new(2.0, 0.0, 0.0)));
        sim.remove_container_units(case, 5);
        let tool = sim.place_object(PREFAB_TOOL, Transform::at(Vec3::new(3.0, 0.0, 0.0)));
        sim.set_object_active(tool, false);
        sim.set_door_open(Vec3::new(-10.2, 0.5, 8.0), true);
        sim.set_time_of_day(19.5);
        sim.set_day(4);
        sim.set_player_display_name("Teimo");
        sim.set_weather(networld_shared::state::Weather {
            kind: WeatherKind::Rain,
            offset: Vec3::new(10.0, 0.0, -4.0),
            rotation: 45.0,
        });
        sim.teleport_vehicle("SATSUMA(557kg, 248)", Transform::at(Vec3::new(50.0, 1.0, 50.0)));
        host.on_world_load().unwrap();
        host
    }

    #[test]
    fn snapshot_captures_registered_world() {
        let host = populated_host();
        let snap = host.write_snapshot();

        assert_eq!(snap.day_time, 19.5);
        assert_eq!(snap.day, 4);
        assert_eq!(snap.mailbox_name, "Teimo");
        assert_eq!(snap.vehicles.len(), 8);
        assert_eq!(snap.pickupables.len(), 3);
        assert_eq!(snap.pickupables[1].aux_data, Some(vec![(FULL_CASE_UNITS - 5) as f32]));
        assert!(!snap.pickupables[2].active);
        assert_eq!(snap.spawn_state, SpawnState::default());
    }

    #[test]
    fn applying_snapshot_reproduces_host_world() {
        let host = populated_host();
        let snap = host.write_snapshot();

        let mut joiner = world(2, SessionRole::Joiner);
        joiner.apply_snapshot(&snap).unwrap();

        let mirrored = joiner.write_snapshot();
        assert_eq!(mirrored, snap);

        let sim = joiner.services();
        assert_eq!(sim.door_open(Vec3::new(-10.2, 0.5, 8.0)), Some(true));
        assert_eq!(
            sim.vehicle_transform("SATSUMA(557kg, 248)").map(|t| t.position),
            Some(Vec3::new(50.0, 1.0, 50.0))
        );
        assert_eq!(sim.object_count(), 3);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let snap = populated_host().write_snapshot();
        let mut joiner = world(2, SessionRole::Joiner);

        joiner.apply_snapshot(&snap).unwrap();
        let objects = joiner.services().object_count();
        let first = joiner.write_snapshot();

        joiner.apply_snapshot(&snap).unwrap();
        assert_eq!(joiner.services().object_count(), objects);
        assert_eq!(joiner.write_snapshot(), first);
    }

    #[test]
    fn unmentioned_inactive_or_lost_pickupables_are_collected() {
        let snap = populated_host().write_snapshot();

        let mut joiner = world(2, SessionRole::Joiner);
        let sim = joiner.services_mut();
        for _ in 0..3 {
            sim.place_object(PREFAB_BOTTLE, Transform::default());
        }
        let active = sim.place_object(PREFAB_TOOL, Transform::default());
        let inactive = sim.place_object(PREFAB_TOOL, Transform::default());
        sim.set_object_active(inactive, false);
        let lost = sim.place_object(PREFAB_TOOL, Transform::default());
        joiner.on_world_load().unwrap();
        joiner.services_mut().lose_object(lost);

        joiner.apply_snapshot(&snap).unwrap();

        // Ids 0..3 are overwritten by the snapshot; 3, 4, 5 are extra.
        assert!(joiner.pickupables().contains(PickupableId(3)));
        assert_eq!(joiner.pickupables().find_by_object(active), Some(PickupableId(3)));
        assert!(!joiner.pickupables().contains(PickupableId(4)));
        assert!(!joiner.pickupables().contains(PickupableId(5)));
        assert!(joiner.services().object_state(inactive).is_none());
    }

    #[test]
    fn missing_fixtures_are_skipped_but_unknown_vehicles_are_fatal() {
        let mut snap = populated_host().write_snapshot();
        snap.doors.push(networld_shared::state::DoorState {
            position: Vec3::new(900.0, 0.0, 0.0),
            open: true,
        });

        let mut joiner = world(2, SessionRole::Joiner);
        joiner.apply_snapshot(&snap).unwrap();

        snap.vehicles.push(VehicleInit {
            id: VehicleId(200),
            transform: Transform::default(),
        });
        assert_eq!(
            joiner.apply_snapshot(&snap),
            Err(SyncError::UnknownVehicle(VehicleId(200)))
        );
    }
}

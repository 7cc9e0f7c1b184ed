//! Update emitter.
//!
//! Turns local simulation events into outbound messages and drives the
//! host's periodic time/day/weather heartbeat.

use networld_shared::{
    event::{LocalEvent, Space},
    ids::{ObjectRef, PickupableId},
    messages::{
        LightSwitch, OpenDoors, PickupObject, PickupableActivate, PickupableDestroy, PickupableSetPosition,
        ReleaseObject, RemoveBottle, VehicleEnter, VehicleLeave, VehicleState, VehicleSwitch,
        WorldPeriodicalUpdate,
    },
    services::WorldServices,
};
use tracing::{debug, info, trace};

use crate::{
    error::{Anomaly, Outcome, SyncError},
    registry::SwitchValue,
    world::{NetWorld, SessionRole},
};

/// Countdown that fires every `interval` seconds of accumulated `dt`.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatTimer {
    interval: f32,
    remaining: f32,
}

impl HeartbeatTimer {
    /// The first beat comes a full interval after start.
    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            remaining: interval,
        }
    }

    /// Returns `true` when the countdown expired; it then restarts from the
    /// full interval.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            self.remaining = self.interval;
            true
        } else {
            false
        }
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }
}

impl<W: WorldServices> NetWorld<W> {
    /// Host-only: broadcasts time, day and weather every heartbeat interval,
    /// as long as somebody is there to hear it.
    pub fn update_heartbeat(&mut self, dt: f32) -> bool {
        if self.role != SessionRole::Host || self.services.remote_participant_count() == 0 {
            return false;
        }
        if !self.heartbeat.tick(dt) {
            return false;
        }
        let global = self.services.global_state();
        let msg = WorldPeriodicalUpdate {
            sun_clock: global.time_of_day.clamp(0.0, 23.0) as u8,
            world_day: global.day.rem_euclid(256) as u8,
            weather: global.weather,
        };
        trace!(sun_clock = msg.sun_clock, day = msg.world_day, "Heartbeat");
        self.broadcast(&msg);
        true
    }

    /// Replicates one local change. Events about objects that are not
    /// replicated pickupables come back as `Ignored` or `Dropped`.
    pub fn handle_local_event(&mut self, event: LocalEvent) -> Result<Outcome, SyncError> {
        match event {
            LocalEvent::ObjectSpawned { object } => self.emit_spawn(object),
            LocalEvent::ObjectActivation { object, activate } => self.emit_activation(object, activate),
            LocalEvent::ObjectDestroyed { object } => {
                let Some(id) = self.pickupables.find_by_object(object) else {
                    return Ok(Anomaly::UnregisteredObject(object).into());
                };
                self.pickupables.unregister(id);
                info!(pickupable = %id, %object, "Destroyed pickupable");
                self.broadcast(&PickupableDestroy { id });
                Ok(Outcome::Applied)
            }
            LocalEvent::ObjectPositionSet { object, position, space } => {
                let id = match self.replicated_id(object) {
                    Ok(id) => id,
                    Err(anomaly) => return Ok(anomaly.into()),
                };
                let position = match space {
                    Space::World => position,
                    Space::Local { origin } => origin + position,
                };
                self.broadcast(&PickupableSetPosition { id, position });
                Ok(Outcome::Applied)
            }
            LocalEvent::DoorToggled { position, open } => {
                self.broadcast(&OpenDoors { position, open });
                Ok(Outcome::Applied)
            }
            LocalEvent::LightToggled { position, on } => {
                self.broadcast(&LightSwitch { position, toggle: on });
                Ok(Outcome::Applied)
            }
            LocalEvent::BottleConsumed { object } => match self.replicated_id(object) {
                Ok(net_id) => {
                    self.broadcast(&RemoveBottle { net_id });
                    Ok(Outcome::Applied)
                }
                Err(anomaly) => Ok(anomaly.into()),
            },
            LocalEvent::ObjectPickedUp { object } => match self.replicated_id(object) {
                Ok(net_id) => {
                    self.broadcast(&PickupObject { net_id });
                    Ok(Outcome::Applied)
                }
                Err(anomaly) => Ok(anomaly.into()),
            },
            LocalEvent::ObjectReleased { drop } => {
                self.broadcast(&ReleaseObject { drop });
                Ok(Outcome::Applied)
            }
            LocalEvent::VehicleEntered { vehicle, passenger } => {
                if self.vehicles.get(vehicle).is_none() {
                    return Ok(Anomaly::UnknownVehicle(vehicle).into());
                }
                self.broadcast(&VehicleEnter {
                    vehicle_id: vehicle,
                    passenger,
                });
                Ok(Outcome::Applied)
            }
            LocalEvent::VehicleLeft => {
                self.broadcast(&VehicleLeave {});
                Ok(Outcome::Applied)
            }
            LocalEvent::VehicleEngineChanged {
                vehicle,
                state,
                dash_state,
                start_time,
            } => {
                let Some(rec) = self.vehicles.get_mut(vehicle) else {
                    return Ok(Anomaly::UnknownVehicle(vehicle).into());
                };
                rec.engine_state = state;
                rec.dash_state = dash_state;
                self.broadcast(&VehicleState {
                    vehicle_id: vehicle,
                    state,
                    dash_state,
                    start_time,
                });
                Ok(Outcome::Applied)
            }
            LocalEvent::VehicleSwitchChanged {
                vehicle,
                switch_id,
                value,
                float_value,
            } => {
                let Some(rec) = self.vehicles.get_mut(vehicle) else {
                    return Ok(Anomaly::UnknownVehicle(vehicle).into());
                };
                rec.switches.insert(
                    switch_id,
                    SwitchValue {
                        on: value,
                        value: float_value,
                    },
                );
                self.broadcast(&VehicleSwitch {
                    vehicle_id: vehicle,
                    switch_id,
                    switch_value: value,
                    float_value,
                });
                Ok(Outcome::Applied)
            }
            LocalEvent::PlayerMoved(sync) => {
                self.broadcast(&sync);
                Ok(Outcome::Applied)
            }
            LocalEvent::VehicleDriven(sync) => {
                self.broadcast(&sync);
                Ok(Outcome::Applied)
            }
        }
    }

    fn replicated_id(&self, object: ObjectRef) -> Result<PickupableId, Anomaly> {
        self.pickupables
            .find_by_object(object)
            .ok_or(Anomaly::UnregisteredObject(object))
    }

    /// Registers a freshly spawned pickupable (or re-announces a known one)
    /// and broadcasts its full description.
    fn emit_spawn(&mut self, object: ObjectRef) -> Result<Outcome, SyncError> {
        let Some(state) = self.services.object_state(object) else {
            return Ok(Anomaly::ObjectGone(object).into());
        };
        if self.services.prefab_type(state.prefab).is_none() {
            trace!(%object, prefab = %state.prefab, "Not a pickupable, spawn not replicated");
            return Ok(Outcome::Ignored);
        }
        let id = match self.pickupables.find_by_object(object) {
            Some(id) => {
                if let Some(rec) = self.pickupables.get_mut(id) {
                    rec.active = state.active;
                }
                id
            }
            None => {
                let Some(id) = self.pickupables.allocate_id() else {
                    return Ok(Anomaly::PickupablePoolExhausted.into());
                };
                self.pickupables.register(id, object, state.prefab, state.active)?;
                debug!(pickupable = %id, %object, prefab = %state.prefab, "Registered local pickupable");
                id
            }
        };
        let msg = self.spawn_message(id, object, &state);
        self.broadcast(&msg);
        Ok(Outcome::Applied)
    }

    /// Activation changes are only sent when they differ from the last
    /// replicated state. Activating an object that was never replicated
    /// promotes it to a full spawn.
    fn emit_activation(&mut self, object: ObjectRef, activate: bool) -> Result<Outcome, SyncError> {
        let Some(id) = self.pickupables.find_by_object(object) else {
            if activate {
                return self.emit_spawn(object);
            }
            return Ok(Outcome::Ignored);
        };
        let Some(rec) = self.pickupables.get_mut(id) else {
            return Ok(Anomaly::UnknownPickupable(id).into());
        };
        if rec.active == activate {
            return Ok(Outcome::Ignored);
        }
        if activate {
            // Peers may have missed changes while it was inactive.
            return self.emit_spawn(object);
        }
        rec.active = false;
        self.broadcast(&PickupableActivate { id, activate: false });
        Ok(Outcome::Applied)
    }
}

//! Inbound message handlers.
//!
//! One method per message kind, all bound by [`bind_world_handlers`].
//! Avatar-related kinds require the sender to be a known participant;
//! world-object kinds do not.

use networld_shared::{
    ids::PeerId,
    messages::{
        AskForWorldState, FullWorldSync, LightSwitch, OpenDoors, PickupObject, PickupableActivate, PickupableDestroy, PickupableSetPosition,
        PickupableSpawn, PlayerSync, ReleaseObject, RemoveBottle, VehicleEnter, VehicleLeave, VehicleState,
        VehicleSwitch, VehicleSync, WorldPeriodicalUpdate,
    },
    services::WorldServices,
};
use tracing::debug;

use crate::{
    error::{Anomaly, Outcome, SyncError},
    registry::SwitchValue,
    router::MessageRouter,
    world::NetWorld,
};

/// Binds every world message kind, including the join pair.
pub fn bind_world_handlers<W: WorldServices + 'static>(router: &mut MessageRouter<NetWorld<W>>) -> Result<(), SyncError> {
    router.bind::<PickupableSpawn, _>(NetWorld::<W>::on_pickupable_spawn)?;
    router.bind::<PickupableActivate, _>(NetWorld::<W>::on_pickupable_activate)?;
    router.bind::<PickupableDestroy, _>(NetWorld::<W>::on_pickupable_destroy)?;
    router.bind::<PickupableSetPosition, _>(NetWorld::<W>::on_pickupable_set_position)?;
    router.bind::<RemoveBottle, _>(NetWorld::<W>::on_remove_bottle)?;
    router.bind::<PickupObject, _>(NetWorld::<W>::on_pickup_object)?;
    router.bind::<ReleaseObject, _>(NetWorld::<W>::on_release_object)?;
    router.bind::<WorldPeriodicalUpdate, _>(NetWorld::<W>::on_world_periodical_update)?;
    router.bind::<OpenDoors, _>(NetWorld::<W>::on_open_doors)?;
    router.bind::<LightSwitch, _>(NetWorld::<W>::on_light_switch)?;
    router.bind::<PlayerSync, _>(NetWorld::<W>::on_player_sync)?;
    router.bind::<VehicleEnter, _>(NetWorld::<W>::on_vehicle_enter)?;
    router.bind::<VehicleLeave, _>(NetWorld::<W>::on_vehicle_leave)?;
    router.bind::<VehicleSync, _>(NetWorld::<W>::on_vehicle_sync)?;
    router.bind::<VehicleState, _>(NetWorld::<W>::on_vehicle_state)?;
    router.bind::<VehicleSwitch, _>(NetWorld::<W>::on_vehicle_switch)?;
    router.bind::<AskForWorldState, _>(NetWorld::<W>::on_ask_for_world_state)?;
    router.bind::<FullWorldSync, _>(NetWorld::<W>::on_full_world_sync)?;
    Ok(())
}

/// Heartbeats carry only the low byte of the day. Picks the full day with
/// that low byte closest to `current`.
fn nearest_day(current: i32, low: u8) -> i32 {
    let base = current - current.rem_euclid(256) + i32::from(low);
    [base - 256, base, base + 256]
        .into_iter()
        .min_by_key(|day| (day - current).abs())
        .unwrap_or(base)
}

impl<W: WorldServices> NetWorld<W> {
    fn require_participant(&self, sender: PeerId) -> Result<(), Anomaly> {
        if self.services.has_participant(sender) {
            Ok(())
        } else {
            Err(Anomaly::UnknownParticipant(sender))
        }
    }

    // ─── Pickupables ───

    fn on_pickupable_spawn(&mut self, _sender: PeerId, msg: PickupableSpawn) -> Result<Outcome, SyncError> {
        self.spawn_pickupable(&msg)?;
        Ok(Outcome::Applied)
    }

    fn on_pickupable_activate(&mut self, _sender: PeerId, msg: PickupableActivate) -> Result<Outcome, SyncError> {
        let Some(rec) = self.pickupables.get_mut(msg.id) else {
            return Ok(Anomaly::UnknownPickupable(msg.id).into());
        };
        rec.active = msg.activate;
        let object = rec.object;
        if self.services.object_state(object).is_none() {
            return Ok(Anomaly::LostObject(msg.id).into());
        }
        self.services.set_object_active(object, msg.activate);
        Ok(Outcome::Applied)
    }

    fn on_pickupable_destroy(&mut self, _sender: PeerId, msg: PickupableDestroy) -> Result<Outcome, SyncError> {
        if !self.destroy_pickupable_local(msg.id) {
            return Ok(Anomaly::UnknownPickupable(msg.id).into());
        }
        debug!(pickupable = %msg.id, "Destroyed remote pickupable");
        Ok(Outcome::Applied)
    }

    fn on_pickupable_set_position(&mut self, _sender: PeerId, msg: PickupableSetPosition) -> Result<Outcome, SyncError> {
        let Some(rec) = self.pickupables.get(msg.id) else {
            return Ok(Anomaly::UnknownPickupable(msg.id).into());
        };
        let object = rec.object;
        if self.services.object_state(object).is_none() {
            return Ok(Anomaly::LostObject(msg.id).into());
        }
        self.services.set_object_position(object, msg.position);
        Ok(Outcome::Applied)
    }

    fn on_remove_bottle(&mut self, _sender: PeerId, msg: RemoveBottle) -> Result<Outcome, SyncError> {
        let Some(rec) = self.pickupables.get(msg.net_id) else {
            return Ok(Anomaly::UnknownPickupable(msg.net_id).into());
        };
        if !self.services.remove_container_units(rec.object, 1) {
            return Ok(Anomaly::NotAContainer(msg.net_id).into());
        }
        Ok(Outcome::Applied)
    }

    fn on_pickup_object(&mut self, sender: PeerId, msg: PickupObject) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        if !self.pickupables.contains(msg.net_id) {
            return Ok(Anomaly::UnknownPickupable(msg.net_id).into());
        }
        self.services.pickup_object(sender, msg.net_id);
        Ok(Outcome::Applied)
    }

    fn on_release_object(&mut self, sender: PeerId, msg: ReleaseObject) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        self.services.release_object(sender, msg.drop);
        Ok(Outcome::Applied)
    }

    // ─── Global state ───

    /// Only whole-hour drift is corrected so local minutes keep running
    /// smoothly between beats.
    fn on_world_periodical_update(&mut self, _sender: PeerId, msg: WorldPeriodicalUpdate) -> Result<Outcome, SyncError> {
        let current = self.services.global_state();
        if current.time_of_day.floor() as u8 != msg.sun_clock {
            self.services.set_time_of_day(f32::from(msg.sun_clock));
        }
        if current.day.rem_euclid(256) as u8 != msg.world_day {
            self.services.set_day(nearest_day(current.day, msg.world_day));
        }
        if current.weather != msg.weather {
            self.services.set_weather(msg.weather);
        }
        Ok(Outcome::Applied)
    }

    fn on_open_doors(&mut self, sender: PeerId, msg: OpenDoors) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        if !self.services.set_door_open(msg.position, msg.open) {
            return Ok(Anomaly::DoorNotFound(msg.position).into());
        }
        Ok(Outcome::Applied)
    }

    fn on_light_switch(&mut self, _sender: PeerId, msg: LightSwitch) -> Result<Outcome, SyncError> {
        if !self.services.set_light_on(msg.position, msg.toggle) {
            return Ok(Anomaly::LightNotFound(msg.position).into());
        }
        Ok(Outcome::Applied)
    }

    // ─── Players & vehicles ───

    fn on_player_sync(&mut self, sender: PeerId, msg: PlayerSync) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        self.services.apply_player_sync(sender, &msg);
        Ok(Outcome::Applied)
    }

    fn on_vehicle_enter(&mut self, sender: PeerId, msg: VehicleEnter) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        if self.vehicles.get(msg.vehicle_id).is_none() {
            return Ok(Anomaly::UnknownVehicle(msg.vehicle_id).into());
        }
        self.services.enter_vehicle(sender, msg.vehicle_id, msg.passenger);
        Ok(Outcome::Applied)
    }

    fn on_vehicle_leave(&mut self, sender: PeerId, _msg: VehicleLeave) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        self.services.leave_vehicle(sender);
        Ok(Outcome::Applied)
    }

    fn on_vehicle_sync(&mut self, sender: PeerId, msg: VehicleSync) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        self.services.apply_vehicle_sync(sender, &msg);
        Ok(Outcome::Applied)
    }

    fn on_vehicle_state(&mut self, sender: PeerId, msg: VehicleState) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        let Some(vehicle) = self.vehicles.get_mut(msg.vehicle_id) else {
            return Ok(Anomaly::UnknownVehicle(msg.vehicle_id).into());
        };
        vehicle.engine_state = msg.state;
        vehicle.dash_state = msg.dash_state;
        self.services
            .set_engine_state(&vehicle.kind, msg.state, msg.dash_state, msg.start_time);
        Ok(Outcome::Applied)
    }

    fn on_vehicle_switch(&mut self, sender: PeerId, msg: VehicleSwitch) -> Result<Outcome, SyncError> {
        if let Err(anomaly) = self.require_participant(sender) {
            return Ok(anomaly.into());
        }
        let Some(vehicle) = self.vehicles.get_mut(msg.vehicle_id) else {
            return Ok(Anomaly::UnknownVehicle(msg.vehicle_id).into());
        };
        vehicle.switches.insert(
            msg.switch_id,
            SwitchValue {
                on: msg.switch_value,
                value: msg.float_value,
            },
        );
        self.services
            .set_vehicle_switch(&vehicle.kind, msg.switch_id, msg.switch_value, msg.float_value);
        Ok(Outcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use networld_shared::{
        config::SyncConfig,
        event::local_event_channel,
        ids::PickupableId,
        math::{Transform, Vec3},
        messages::{NetMessage, PickupableActivate, PickupableSetPosition, PickupableSpawn, WorldPeriodicalUpdate},
        net::Frame,
        services::Environment,
        sim::{SimWorld, PREFAB_TOOL},
    };

    use super::*;
    use crate::{engine::SyncEngine, world::SessionRole};

    const HOST: PeerId = PeerId(1);
    const JOINER: PeerId = PeerId(2);

    fn synchronized_joiner() -> SyncEngine<SimWorld> {
        let cfg = SyncConfig::default();
        let (tx, rx) = local_event_channel();
        let mut sim = SimWorld::standard(JOINER, &cfg.vehicle_kinds);
        sim.attach_events(tx);
        sim.add_participant(HOST);
        let mut engine = SyncEngine::new(sim, &cfg, SessionRole::Joiner, JOINER, rx).unwrap();
        engine.world_mut().join.complete(HOST);
        engine
    }

    fn frame<M: NetMessage>(msg: &M) -> Frame {
        Frame::from_message(HOST, msg).unwrap()
    }

    fn beat(world_day: u8) -> WorldPeriodicalUpdate {
        WorldPeriodicalUpdate {
            sun_clock: 12,
            world_day,
            weather: Default::default(),
        }
    }

    #[test]
    fn nearest_day_keeps_the_high_part() {
        assert_eq!(nearest_day(300, 44), 300);
        assert_eq!(nearest_day(300, 45), 301);
        assert_eq!(nearest_day(255, 0), 256);
        assert_eq!(nearest_day(256, 255), 255);
        assert_eq!(nearest_day(3, 5), 5);
    }

    #[test]
    fn periodic_update_keeps_days_past_255() {
        let mut joiner = synchronized_joiner();
        joiner.services_mut().set_time_of_day(12.5);
        joiner.services_mut().set_day(300);

        joiner.dispatch_frame(&frame(&beat(44))).unwrap();
        assert_eq!(joiner.services().global_state().day, 300);

        joiner.dispatch_frame(&frame(&beat(45))).unwrap();
        assert_eq!(joiner.services().global_state().day, 301);
    }

    #[test]
    fn updates_for_unknown_ids_are_dropped() {
        let mut joiner = synchronized_joiner();
        let id = PickupableId(50);

        let activate = PickupableActivate { id, activate: true };
        assert_eq!(
            joiner.dispatch_frame(&frame(&activate)).unwrap(),
            Outcome::Dropped(Anomaly::UnknownPickupable(id))
        );

        let moved = PickupableSetPosition {
            id,
            position: Vec3::new(1.0, 2.0, 3.0),
        };
        assert_eq!(
            joiner.dispatch_frame(&frame(&moved)).unwrap(),
            Outcome::Dropped(Anomaly::UnknownPickupable(id))
        );
        assert_eq!(joiner.services().object_count(), 0);
    }

    #[test]
    fn spawn_with_sentinel_id_leaves_no_object() {
        let mut joiner = synchronized_joiner();
        let msg = PickupableSpawn {
            id: PickupableId::INVALID,
            prefab: PREFAB_TOOL,
            transform: Transform::default(),
            active: true,
            aux_data: None,
        };
        assert_eq!(
            joiner.dispatch_frame(&frame(&msg)),
            Err(SyncError::PickupableIdOutOfRange(PickupableId::INVALID))
        );
        assert_eq!(joiner.services().object_count(), 0);
        assert!(joiner.services().objects_of_prefab(PREFAB_TOOL).is_empty());
    }
}

//! Engine facade.
//!
//! `SyncEngine` wires the router to the world, gates inbound traffic on the
//! join state and logs every dropped message or event in one place. The
//! session layer feeds it frames and ticks, then drains the outbox.

use networld_shared::{
    config::SyncConfig,
    event::LocalEventReceiver,
    ids::PeerId,
    messages::MessageKind,
    net::Frame,
    services::WorldServices,
};
use tracing::{debug, info, warn};

use crate::{
    error::{Anomaly, Outcome, SyncError},
    handlers::bind_world_handlers,
    join::{JoinState, SessionSignal},
    outbox::Outgoing,
    router::MessageRouter,
    world::{NetWorld, SessionRole},
};

pub struct SyncEngine<W> {
    router: MessageRouter<NetWorld<W>>,
    world: NetWorld<W>,
    events: LocalEventReceiver,
}

impl<W: WorldServices + 'static> SyncEngine<W> {
    pub fn new(
        services: W,
        cfg: &SyncConfig,
        role: SessionRole,
        local_peer: PeerId,
        events: LocalEventReceiver,
    ) -> Result<Self, SyncError> {
        let world = NetWorld::new(services, cfg, role, local_peer)?;
        let mut router = MessageRouter::new();
        bind_world_handlers(&mut router)?;
        info!(
            peer = %local_peer,
            ?role,
            vehicles = world.vehicles().len(),
            "Sync engine ready"
        );
        Ok(Self { router, world, events })
    }

    /// Routes one inbound message. `Err` is fatal for the session.
    pub fn dispatch(&mut self, sender: PeerId, kind: MessageKind, payload: &[u8]) -> Result<Outcome, SyncError> {
        let outcome = if self.world.join.accepts(kind) {
            self.router.dispatch(&mut self.world, sender, kind, payload)?
        } else {
            Outcome::Dropped(Anomaly::NotSynchronized(kind))
        };
        if let Outcome::Dropped(anomaly) = &outcome {
            warn!(%sender, ?kind, %anomaly, "Dropped message");
        }
        Ok(outcome)
    }

    pub fn dispatch_frame(&mut self, frame: &Frame) -> Result<Outcome, SyncError> {
        self.dispatch(frame.sender, frame.kind, &frame.payload)
    }

    /// Replicates every local event reported since the last pump.
    pub fn pump_local_events(&mut self) -> Result<usize, SyncError> {
        let events = self.events.drain();
        let count = events.len();
        for event in events {
            if let Outcome::Dropped(anomaly) = self.world.handle_local_event(event)? {
                warn!(%anomaly, "Dropped local event");
            }
        }
        Ok(count)
    }

    /// Variable-rate tick: local events, then the heartbeat.
    pub fn update(&mut self, dt: f32) -> Result<(), SyncError> {
        self.pump_local_events()?;
        self.world.update_heartbeat(dt);
        Ok(())
    }

    /// Fixed-rate tick: per-vehicle physics reconciliation.
    pub fn fixed_update(&mut self, dt: f32) {
        let NetWorld { services, vehicles, .. } = &mut self.world;
        for vehicle in vehicles.iter() {
            services.fixed_update(&vehicle.kind, dt);
        }
    }

    pub fn begin_join(&mut self) -> bool {
        self.world.begin_join()
    }

    pub fn leave_session(&mut self) {
        self.world.leave_session();
        debug!(state = ?self.world.join_state(), "Left session");
    }

    pub fn on_world_load(&mut self) -> Result<usize, SyncError> {
        self.world.on_world_load()
    }

    pub fn on_world_unload(&mut self) {
        self.world.on_world_unload();
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        self.world.outbox.drain()
    }

    pub fn drain_signals(&mut self) -> Vec<SessionSignal> {
        self.world.join.drain_signals()
    }

    pub fn join_state(&self) -> JoinState {
        self.world.join_state()
    }

    pub fn is_host(&self) -> bool {
        self.world.is_host()
    }

    pub fn local_peer(&self) -> PeerId {
        self.world.local_peer()
    }

    pub fn world(&self) -> &NetWorld<W> {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut NetWorld<W> {
        &mut self.world
    }

    pub fn services(&self) -> &W {
        self.world.services()
    }

    pub fn services_mut(&mut self) -> &mut W {
        self.world.services_mut()
    }
}

#[cfg(test)]
mod tests {
    use networld_shared::{
        event::local_event_channel,
        ids::{PickupableId, VehicleId},
        math::{Transform, Vec3},
        messages::{
            FullWorldSync, NetMessage, OpenDoors, PickupableDestroy, PickupableSpawn, PlayerSync, VehicleState,
            WorldPeriodicalUpdate,
        },
        services::{Environment, Fixtures, Participants, SceneObjects},
        sim::{SimWorld, PREFAB_BOTTLE, PREFAB_TOOL},
        state::{EngineState, Weather, WeatherKind},
    };

    use super::*;
    use crate::outbox::Target;

    const HOST: PeerId = PeerId(1);
    const JOINER: PeerId = PeerId(2);

    fn engine(peer: PeerId, role: SessionRole, others: &[PeerId]) -> SyncEngine<SimWorld> {
        let cfg = SyncConfig::default();
        let (tx, rx) = local_event_channel();
        let mut sim = SimWorld::standard(peer, &cfg.vehicle_kinds);
        sim.attach_events(tx);
        for other in others {
            sim.add_participant(*other);
        }
        SyncEngine::new(sim, &cfg, role, peer, rx).unwrap()
    }

    fn frame<M: NetMessage>(sender: PeerId, msg: &M) -> Frame {
        Frame::from_message(sender, msg).unwrap()
    }

    fn spawn(id: u16, prefab: networld_shared::ids::PrefabId) -> PickupableSpawn {
        PickupableSpawn {
            id: PickupableId(id),
            prefab,
            transform: Transform::at(Vec3::new(id as f32, 0.0, 0.0)),
            active: true,
            aux_data: None,
        }
    }

    #[test]
    fn remote_spawn_replaces_different_prefab_under_same_id() {
        let mut host = engine(HOST, SessionRole::Host, &[JOINER]);

        let outcome = host.dispatch_frame(&frame(JOINER, &spawn(7, PREFAB_BOTTLE))).unwrap();
        assert!(outcome.is_applied());
        let bottle = host.world().pickupables().get(PickupableId(7)).unwrap().object;

        host.dispatch_frame(&frame(JOINER, &spawn(7, PREFAB_TOOL))).unwrap();
        let rec = *host.world().pickupables().get(PickupableId(7)).unwrap();
        assert_eq!(rec.prefab, PREFAB_TOOL);
        assert_ne!(rec.object, bottle);
        assert!(host.services().object_state(bottle).is_none());
        assert_eq!(host.services().object_count(), 1);
    }

    #[test]
    fn destroy_of_unknown_id_is_dropped() {
        let mut host = engine(HOST, SessionRole::Host, &[JOINER]);
        let outcome = host
            .dispatch_frame(&frame(JOINER, &PickupableDestroy { id: PickupableId(42) }))
            .unwrap();
        assert_eq!(outcome, Outcome::Dropped(Anomaly::UnknownPickupable(PickupableId(42))));
    }

    #[test]
    fn avatar_messages_require_a_participant() {
        let mut host = engine(HOST, SessionRole::Host, &[JOINER]);
        let sync = PlayerSync {
            transform: Transform::at(Vec3::new(3.0, 0.0, 3.0)),
            crouching: false,
        };

        let stranger = PeerId(99);
        let outcome = host.dispatch_frame(&frame(stranger, &sync)).unwrap();
        assert_eq!(outcome, Outcome::Dropped(Anomaly::UnknownParticipant(stranger)));

        assert!(host.dispatch_frame(&frame(JOINER, &sync)).unwrap().is_applied());
        assert_eq!(host.services().player(JOINER).and_then(|p| p.last_sync.clone()), Some(sync));

        let door = Vec3::new(-12.8, 0.5, 3.1);
        let open = OpenDoors { position: door, open: true };
        assert!(host.dispatch_frame(&frame(JOINER, &open)).unwrap().is_applied());
        assert_eq!(host.services().door_open(door), Some(true));
    }

    #[test]
    fn remote_engine_state_updates_mirror_and_body() {
        let mut host = engine(HOST, SessionRole::Host, &[JOINER]);
        let msg = VehicleState {
            vehicle_id: VehicleId(2),
            state: EngineState::Starting,
            dash_state: 1,
            start_time: Some(0.4),
        };
        assert!(host.dispatch_frame(&frame(JOINER, &msg)).unwrap().is_applied());
        assert_eq!(
            host.world().vehicles().get(VehicleId(2)).map(|v| v.engine_state),
            Some(EngineState::Starting)
        );
        assert_eq!(
            host.services().vehicle("SATSUMA(557kg, 248)").map(|v| v.engine),
            Some(EngineState::Starting)
        );
    }

    #[test]
    fn periodic_update_corrects_whole_hours_only() {
        let mut joiner = engine(JOINER, SessionRole::Joiner, &[HOST]);
        joiner.world_mut().join.complete(HOST);
        joiner.services_mut().set_time_of_day(18.25);

        let weather = Weather {
            kind: WeatherKind::Thunder,
            ..Default::default()
        };
        let beat = WorldPeriodicalUpdate {
            sun_clock: 18,
            world_day: 3,
            weather,
        };
        joiner.dispatch_frame(&frame(HOST, &beat)).unwrap();
        let global = joiner.services().global_state();
        assert_eq!(global.time_of_day, 18.25);
        assert_eq!(global.day, 3);
        assert_eq!(global.weather, weather);

        let beat = WorldPeriodicalUpdate { sun_clock: 20, ..beat };
        joiner.dispatch_frame(&frame(HOST, &beat)).unwrap();
        assert_eq!(joiner.services().global_state().time_of_day, 20.0);
    }

    #[test]
    fn unsynchronized_joiner_drops_world_messages() {
        let mut joiner = engine(JOINER, SessionRole::Joiner, &[HOST]);
        let outcome = joiner.dispatch_frame(&frame(HOST, &spawn(0, PREFAB_TOOL))).unwrap();
        assert_eq!(
            outcome,
            Outcome::Dropped(Anomaly::NotSynchronized(MessageKind::PickupableSpawn))
        );
        assert_eq!(joiner.services().object_count(), 0);
    }

    #[test]
    fn join_restores_vehicle_seat_and_signals_world_loaded() {
        let mut host = engine(HOST, SessionRole::Host, &[JOINER]);
        host.services_mut().place_object(PREFAB_TOOL, Transform::default());
        host.on_world_load().unwrap();
        host.services_mut().enter_vehicle(JOINER, VehicleId(1), false);

        let mut joiner = engine(JOINER, SessionRole::Joiner, &[HOST]);
        assert!(joiner.begin_join());
        assert!(!joiner.begin_join());
        assert_eq!(joiner.join_state(), JoinState::AwaitingWorldState);

        let ask = joiner.drain_outbox();
        assert_eq!(ask.len(), 1);
        assert_eq!(ask[0].target, Target::Host);
        host.dispatch_frame(&ask[0].frame).unwrap();

        let reply = host.drain_outbox();
        assert_eq!(reply[0].target, Target::Peer(JOINER));
        assert_eq!(reply[0].kind(), MessageKind::FullWorldSync);
        assert!(joiner.dispatch_frame(&reply[0].frame).unwrap().is_applied());

        assert_eq!(joiner.join_state(), JoinState::Synchronized);
        assert_eq!(joiner.drain_signals(), vec![SessionSignal::WorldLoaded { host: HOST }]);
        let me = joiner.services().player(JOINER).unwrap();
        assert_eq!(me.state.occupied_vehicle, Some(VehicleId(1)));
        assert!(!me.state.passenger);
        assert!(joiner.services().player(HOST).unwrap().spawned);
        assert_eq!(joiner.world().pickupables().len(), 1);
    }

    #[test]
    fn join_messages_are_checked_against_role_and_state() {
        let mut host = engine(HOST, SessionRole::Host, &[JOINER]);
        let snapshot = host.world().write_snapshot();
        let outcome = host.dispatch_frame(&frame(JOINER, &snapshot)).unwrap();
        assert_eq!(outcome, Outcome::Dropped(Anomaly::UnexpectedWorldSync));

        let mut joiner = engine(JOINER, SessionRole::Joiner, &[HOST]);
        let ask = frame(PeerId(3), &networld_shared::messages::AskForWorldState {});
        assert_eq!(joiner.dispatch_frame(&ask).unwrap(), Outcome::Dropped(Anomaly::NotHost));
    }

    #[test]
    fn world_sync_from_unknown_sender_is_fatal() {
        let host = engine(HOST, SessionRole::Host, &[]);
        let snapshot: FullWorldSync = host.world().write_snapshot();

        let mut joiner = engine(JOINER, SessionRole::Joiner, &[]);
        joiner.begin_join();
        assert_eq!(
            joiner.dispatch_frame(&frame(HOST, &snapshot)),
            Err(SyncError::UnknownParticipant(HOST))
        );
    }

    #[test]
    fn join_with_unknown_vehicle_in_spawn_state_is_fatal() {
        let host = engine(HOST, SessionRole::Host, &[JOINER]);
        let mut snapshot = host.world().write_snapshot();
        snapshot.spawn_state.occupied_vehicle = Some(VehicleId(77));

        let mut joiner = engine(JOINER, SessionRole::Joiner, &[HOST]);
        joiner.begin_join();
        assert_eq!(
            joiner.dispatch_frame(&frame(HOST, &snapshot)),
            Err(SyncError::UnknownVehicle(VehicleId(77)))
        );
        assert_ne!(joiner.join_state(), JoinState::Synchronized);
    }

    #[test]
    fn join_reacquires_held_object_only_when_known() {
        let mut host = engine(HOST, SessionRole::Host, &[JOINER]);
        host.services_mut().place_object(PREFAB_TOOL, Transform::default());
        host.on_world_load().unwrap();
        let mut snapshot = host.world().write_snapshot();
        snapshot.spawn_state.held_object = Some(PickupableId(0));

        let mut joiner = engine(JOINER, SessionRole::Joiner, &[HOST]);
        joiner.begin_join();
        assert!(joiner.dispatch_frame(&frame(HOST, &snapshot)).unwrap().is_applied());
        assert_eq!(
            joiner.services().player(JOINER).and_then(|p| p.state.held_object),
            Some(PickupableId(0))
        );

        snapshot.spawn_state.held_object = Some(PickupableId(9));
        let mut other = engine(JOINER, SessionRole::Joiner, &[HOST]);
        other.begin_join();
        assert!(other.dispatch_frame(&frame(HOST, &snapshot)).unwrap().is_applied());
        assert_eq!(other.services().player(JOINER).and_then(|p| p.state.held_object), None);
    }

    #[test]
    fn fixed_update_steps_every_vehicle() {
        let mut host = engine(HOST, SessionRole::Host, &[]);
        host.fixed_update(1.0 / 60.0);
        host.fixed_update(1.0 / 60.0);
        assert_eq!(host.services().vehicle("FLATBED").map(|v| v.fixed_steps), Some(2));
    }

    #[test]
    fn local_events_flow_to_outbox_on_update() {
        let mut host = engine(HOST, SessionRole::Host, &[JOINER]);
        host.services_mut().toggle_light_local(Vec3::new(-11.0, 1.4, 7.6), true);
        host.update(0.016).unwrap();

        let out = host.drain_outbox();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), MessageKind::LightSwitch);
        assert_eq!(out[0].target, Target::All);
        assert_eq!(host.services().light_on(Vec3::new(-11.0, 1.4, 7.6)), Some(true));
    }
}

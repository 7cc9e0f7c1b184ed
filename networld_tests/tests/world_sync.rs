//! Multi-peer world synchronization over the in-process mesh.

use std::collections::BTreeSet;

use networld_shared::{
    config::SyncConfig,
    event::Space,
    ids::{PeerId, PickupableId, VehicleId},
    math::{Transform, Vec3},
    messages::{MessageKind, PickupableDestroy, PickupableSpawn},
    net::Frame,
    services::{Environment, Fixtures, SceneObjects, VehicleBodies},
    sim::{SimWorld, PREFAB_BEER_CASE, PREFAB_BOTTLE, PREFAB_SAUSAGES, PREFAB_TOOL},
    state::{Weather, WeatherKind},
};
use networld_sync::{registry::VehicleRegistry, Anomaly, JoinState, Outcome};
use networld_tests::LocalMesh;
use rand::{rngs::StdRng, Rng, SeedableRng};

const HOST: PeerId = PeerId(0x10);
const PENA: PeerId = PeerId(0x20);
const TEIMO: PeerId = PeerId(0x30);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn stocked_host(cfg: &SyncConfig) -> SimWorld {
    let mut world = SimWorld::standard(HOST, &cfg.vehicle_kinds);
    world.place_object(PREFAB_BEER_CASE, Transform::at(Vec3::new(-8.0, 0.6, 9.0)));
    world.place_object(PREFAB_BOTTLE, Transform::at(Vec3::new(-8.5, 0.9, 9.5)));
    world.place_object(PREFAB_BOTTLE, Transform::at(Vec3::new(-8.2, 0.9, 9.5)));
    world.place_object(PREFAB_SAUSAGES, Transform::at(Vec3::new(-9.4, 0.9, 10.2)));
    world
}

fn mesh_with_joiner() -> anyhow::Result<LocalMesh> {
    init_tracing();
    let cfg = SyncConfig::default();
    let mut mesh = LocalMesh::host(cfg.clone(), HOST, stocked_host(&cfg))?;
    mesh.join(PENA)?;
    mesh.settle()?;
    Ok(mesh)
}

fn frame<M: networld_shared::messages::NetMessage>(sender: PeerId, msg: &M) -> Frame {
    Frame::from_message(sender, msg).unwrap()
}

#[test]
fn vehicle_ids_follow_declaration_order() {
    let registry = VehicleRegistry::with_kinds(&["A", "B", "C"]).unwrap();
    let ids: Vec<(String, VehicleId)> = registry.iter().map(|v| (v.kind.clone(), v.id)).collect();
    assert_eq!(
        ids,
        vec![
            ("A".to_string(), VehicleId(0)),
            ("B".to_string(), VehicleId(1)),
            ("C".to_string(), VehicleId(2)),
        ]
    );
}

#[test]
fn join_reports_host_vehicle_position_and_synchronizes() -> anyhow::Result<()> {
    init_tracing();
    let cfg = SyncConfig::default();
    let mut host_world = stocked_host(&cfg);
    let p = Transform::at(Vec3::new(120.0, 2.5, -40.0));
    host_world.teleport_vehicle(&cfg.vehicle_kinds[1], p);

    let mut mesh = LocalMesh::host(cfg.clone(), HOST, host_world)?;
    let snapshot = mesh.engine(HOST).world().write_snapshot();
    let reported = snapshot.vehicles.iter().find(|v| v.id == VehicleId(1)).map(|v| v.transform);
    assert_eq!(reported, Some(p));

    mesh.join(PENA)?;
    assert_eq!(mesh.engine(PENA).join_state(), JoinState::AwaitingWorldState);
    mesh.settle()?;

    assert_eq!(mesh.engine(PENA).join_state(), JoinState::Synchronized);
    assert_eq!(mesh.world(PENA).vehicle_transform(&cfg.vehicle_kinds[1]), Some(p));
    assert_eq!(mesh.deliveries_of(MessageKind::FullWorldSync).len(), 1);
    Ok(())
}

#[test]
fn join_round_trip_matches_host_except_lost_objects() -> anyhow::Result<()> {
    init_tracing();
    let cfg = SyncConfig::default();
    let mut mesh = LocalMesh::host(cfg, HOST, stocked_host(&SyncConfig::default()))?;

    let host_world = mesh.world_mut(HOST);
    host_world.set_door_open(Vec3::new(-10.2, 0.5, 8.0), true);
    host_world.set_light_on(Vec3::new(-13.2, 1.4, 2.2), false);
    host_world.set_weather(Weather {
        kind: WeatherKind::Cloudy,
        offset: Vec3::new(3.0, 0.0, 3.0),
        rotation: 90.0,
    });
    let lost = host_world.objects_of_prefab(PREFAB_SAUSAGES)[0];
    host_world.lose_object(lost);

    mesh.join(PENA)?;
    mesh.settle()?;

    let host_snap = mesh.engine(HOST).world().write_snapshot();
    let joiner_snap = mesh.engine(PENA).world().write_snapshot();
    assert_eq!(host_snap.pickupables.len(), 3);
    assert_eq!(joiner_snap.pickupables, host_snap.pickupables);
    assert_eq!(joiner_snap.vehicles, host_snap.vehicles);
    assert_eq!(joiner_snap.doors, host_snap.doors);
    assert_eq!(joiner_snap.lights, host_snap.lights);
    assert_eq!(joiner_snap.weather, host_snap.weather);
    assert_eq!(mesh.world(PENA).objects_of_prefab(PREFAB_SAUSAGES).len(), 0);
    Ok(())
}

#[test]
fn identical_spawn_twice_is_a_no_op() -> anyhow::Result<()> {
    let mut mesh = mesh_with_joiner()?;
    let spawn = PickupableSpawn {
        id: PickupableId(40),
        prefab: PREFAB_TOOL,
        transform: Transform::at(Vec3::new(1.0, 1.0, 1.0)),
        active: true,
        aux_data: None,
    };

    let engine = mesh.engine_mut(PENA);
    engine.dispatch_frame(&frame(HOST, &spawn))?;
    let objects = engine.services().object_count();
    let snap = engine.world().write_snapshot();

    engine.dispatch_frame(&frame(HOST, &spawn))?;
    assert_eq!(engine.services().object_count(), objects);
    assert_eq!(engine.world().write_snapshot(), snap);
    Ok(())
}

#[test]
fn same_id_with_new_prefab_replaces_object() -> anyhow::Result<()> {
    let mut mesh = mesh_with_joiner()?;
    let mut spawn = PickupableSpawn {
        id: PickupableId(7),
        prefab: PREFAB_BOTTLE,
        transform: Transform::default(),
        active: true,
        aux_data: None,
    };

    let engine = mesh.engine_mut(HOST);
    engine.dispatch_frame(&frame(PENA, &spawn))?;
    let bottle = engine.world().pickupables().get(PickupableId(7)).map(|p| p.object);

    spawn.prefab = PREFAB_TOOL;
    engine.dispatch_frame(&frame(PENA, &spawn))?;

    let rec = engine.world().pickupables().get(PickupableId(7)).copied().unwrap();
    assert_eq!(rec.prefab, PREFAB_TOOL);
    assert!(engine.services().object_state(bottle.unwrap()).is_none());
    let tools: Vec<_> = engine
        .world()
        .pickupables()
        .iter()
        .filter(|p| p.id == PickupableId(7))
        .collect();
    assert_eq!(tools.len(), 1);
    Ok(())
}

#[test]
fn destroy_for_unknown_id_is_a_logged_no_op() -> anyhow::Result<()> {
    let mut mesh = mesh_with_joiner()?;
    let before = mesh.engine(HOST).world().pickupables().len();

    let outcome = mesh
        .engine_mut(HOST)
        .dispatch_frame(&frame(PENA, &PickupableDestroy { id: PickupableId(999) }))?;

    assert_eq!(outcome, Outcome::Dropped(Anomaly::UnknownPickupable(PickupableId(999))));
    assert_eq!(mesh.engine(HOST).world().pickupables().len(), before);
    Ok(())
}

#[test]
fn freed_id_is_reused_before_higher_ids() -> anyhow::Result<()> {
    init_tracing();
    let cfg = SyncConfig::default();
    let mut mesh = LocalMesh::host(cfg.clone(), HOST, SimWorld::standard(HOST, &cfg.vehicle_kinds))?;

    let mut objects = Vec::new();
    for i in 0..5 {
        let at = Transform::at(Vec3::new(i as f32, 0.0, 0.0));
        objects.push(mesh.world_mut(HOST).spawn_local(PREFAB_TOOL, at));
    }
    mesh.settle()?;
    assert_eq!(
        mesh.engine(HOST).world().pickupables().find_by_object(objects[3]),
        Some(PickupableId(3))
    );

    mesh.world_mut(HOST).destroy_local(objects[3]);
    mesh.settle()?;
    let fresh = mesh.world_mut(HOST).spawn_local(PREFAB_BOTTLE, Transform::default());
    mesh.settle()?;

    assert_eq!(
        mesh.engine(HOST).world().pickupables().find_by_object(fresh),
        Some(PickupableId(3))
    );
    Ok(())
}

#[test]
fn heartbeat_reaches_joiner_on_third_tick() -> anyhow::Result<()> {
    let mut mesh = mesh_with_joiner()?;
    mesh.world_mut(HOST).set_time_of_day(9.5);
    mesh.world_mut(HOST).set_day(6);

    mesh.tick(4.0)?;
    mesh.tick(4.0)?;
    assert!(mesh.deliveries_of(MessageKind::WorldPeriodicalUpdate).is_empty());

    mesh.tick(4.0)?;
    let beats = mesh.deliveries_of(MessageKind::WorldPeriodicalUpdate);
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0].to, PENA);

    let global = mesh.world(PENA).global_state();
    assert_eq!(global.time_of_day.floor(), 9.0);
    assert_eq!(global.day, 6);
    Ok(())
}

#[test]
fn joiner_actions_are_relayed_to_other_joiners() -> anyhow::Result<()> {
    let mut mesh = mesh_with_joiner()?;
    mesh.join(TEIMO)?;
    mesh.settle()?;
    assert_eq!(mesh.engine(TEIMO).join_state(), JoinState::Synchronized);

    let door = Vec3::new(-12.8, 0.5, 3.1);
    mesh.world_mut(PENA).open_door_local(door, true);
    let case = mesh.world_mut(PENA).spawn_local(PREFAB_BEER_CASE, Transform::at(Vec3::new(2.0, 0.0, 2.0)));
    mesh.settle()?;

    for peer in [HOST, TEIMO] {
        assert_eq!(mesh.world(peer).door_open(door), Some(true), "door on {peer}");
    }
    let id = mesh.engine(PENA).world().pickupables().find_by_object(case).unwrap();
    let host_copy = mesh.engine(HOST).world().pickupables().get(id).copied().unwrap();
    let teimo_copy = mesh.engine(TEIMO).world().pickupables().get(id).copied().unwrap();
    assert_eq!(host_copy.prefab, PREFAB_BEER_CASE);
    assert_eq!(teimo_copy.prefab, PREFAB_BEER_CASE);

    mesh.world_mut(PENA).consume_bottle_local(case);
    mesh.world_mut(PENA).move_local(
        case,
        Vec3::new(0.0, 1.0, 0.0),
        Space::Local {
            origin: Vec3::new(2.0, 0.0, 2.0),
        },
    );
    mesh.settle()?;

    let teimo = mesh.world(TEIMO);
    assert_eq!(teimo.container_units(teimo_copy.object), Some(23));
    assert_eq!(
        teimo.object_state(teimo_copy.object).map(|s| s.transform.position),
        Some(Vec3::new(2.0, 1.0, 2.0))
    );
    Ok(())
}

#[test]
fn departed_peer_is_no_longer_a_participant() -> anyhow::Result<()> {
    let mut mesh = mesh_with_joiner()?;
    mesh.join(TEIMO)?;
    mesh.settle()?;

    mesh.leave(TEIMO);
    let door = Vec3::new(-7.4, 0.5, 14.6);
    let outcome = mesh.engine_mut(HOST).dispatch_frame(&frame(
        TEIMO,
        &networld_shared::messages::OpenDoors {
            position: door,
            open: false,
        },
    ))?;
    assert_eq!(outcome, Outcome::Dropped(Anomaly::UnknownParticipant(TEIMO)));
    assert_eq!(mesh.world(HOST).door_open(door), Some(true));
    Ok(())
}

#[test]
fn random_spawn_destroy_keeps_ids_unique_and_mirrored() -> anyhow::Result<()> {
    let mut mesh = mesh_with_joiner()?;
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let prefabs = [PREFAB_BOTTLE, PREFAB_TOOL, PREFAB_SAUSAGES, PREFAB_BEER_CASE];

    for _ in 0..300 {
        let actor = if rng.gen_bool(0.5) { HOST } else { PENA };
        let live: Vec<_> = mesh
            .engine(actor)
            .world()
            .pickupables()
            .iter()
            .map(|p| p.object)
            .collect();
        if live.is_empty() || rng.gen_bool(0.6) {
            let prefab = prefabs[rng.gen_range(0..prefabs.len())];
            let at = Transform::at(Vec3::new(rng.gen_range(-50.0..50.0), 0.0, rng.gen_range(-50.0..50.0)));
            mesh.world_mut(actor).spawn_local(prefab, at);
        } else {
            let object = live[rng.gen_range(0..live.len())];
            mesh.world_mut(actor).destroy_local(object);
        }
        mesh.settle()?;

        let host_ids: BTreeSet<_> = mesh.engine(HOST).world().pickupables().ids().into_iter().collect();
        let pena_ids: BTreeSet<_> = mesh.engine(PENA).world().pickupables().ids().into_iter().collect();
        assert_eq!(host_ids, pena_ids);

        for peer in [HOST, PENA] {
            let registry = mesh.engine(peer).world().pickupables();
            let objects: BTreeSet<_> = registry.iter().map(|p| p.object).collect();
            assert_eq!(objects.len(), registry.len(), "two ids share an object on {peer}");
        }
    }
    Ok(())
}

//! `networld_tests`
//!
//! In-process session harness. [`LocalMesh`] runs one host and any number of
//! joiners over simulated worlds, moving frames between them through the
//! real wire encoding with the same star routing the TCP node uses.

use std::collections::{BTreeMap, VecDeque};

use anyhow::Context;
use networld_shared::{
    config::SyncConfig,
    event::local_event_channel,
    ids::PeerId,
    messages::MessageKind,
    net::Frame,
    sim::SimWorld,
};
use networld_sync::{Outcome, SessionRole, SyncEngine, Target};
use tracing::debug;

/// Upper bound on frames delivered by one [`LocalMesh::settle`].
const MAX_DELIVERIES: usize = 100_000;

/// One frame handed to a peer's engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub from: PeerId,
    pub to: PeerId,
    pub kind: MessageKind,
    pub outcome: Outcome,
}

struct InFlight {
    /// Connection the frame arrived on.
    link: PeerId,
    to: PeerId,
    frame: Frame,
}

pub struct LocalMesh {
    cfg: SyncConfig,
    host: PeerId,
    peers: BTreeMap<PeerId, SyncEngine<SimWorld>>,
    in_flight: VecDeque<InFlight>,
    log: Vec<Delivery>,
}

impl LocalMesh {
    /// Starts a session hosted by `host` over `world`, which is loaded
    /// immediately.
    pub fn host(cfg: SyncConfig, host: PeerId, mut world: SimWorld) -> anyhow::Result<Self> {
        let (tx, rx) = local_event_channel();
        world.attach_events(tx);
        let mut engine = SyncEngine::new(world, &cfg, SessionRole::Host, host, rx)?;
        engine.on_world_load()?;

        let mut peers = BTreeMap::new();
        peers.insert(host, engine);
        Ok(Self {
            cfg,
            host,
            peers,
            in_flight: VecDeque::new(),
            log: Vec::new(),
        })
    }

    /// Connects a joiner with the stock map and sends its world request.
    /// Call [`settle`](Self::settle) to complete the join.
    pub fn join(&mut self, peer: PeerId) -> anyhow::Result<()> {
        let world = SimWorld::standard(peer, &self.cfg.vehicle_kinds);
        self.join_with(peer, world)
    }

    pub fn join_with(&mut self, peer: PeerId, mut world: SimWorld) -> anyhow::Result<()> {
        if self.peers.contains_key(&peer) {
            anyhow::bail!("peer {peer} already in the mesh");
        }
        for (existing, engine) in self.peers.iter_mut() {
            world.add_participant(*existing);
            engine.services_mut().add_participant(peer);
        }
        let (tx, rx) = local_event_channel();
        world.attach_events(tx);
        let mut engine = SyncEngine::new(world, &self.cfg, SessionRole::Joiner, peer, rx)?;
        engine.on_world_load()?;
        engine.begin_join();
        self.peers.insert(peer, engine);
        debug!(%peer, "Joiner attached to mesh");
        Ok(())
    }

    /// Disconnects `peer`; everybody else forgets its participant.
    pub fn leave(&mut self, peer: PeerId) {
        if self.peers.remove(&peer).is_none() {
            return;
        }
        for engine in self.peers.values_mut() {
            engine.services_mut().remove_participant(peer);
        }
        self.in_flight.retain(|f| f.to != peer && f.link != peer);
    }

    pub fn host_id(&self) -> PeerId {
        self.host
    }

    /// # Panics
    /// If `peer` is not in the mesh.
    pub fn engine(&self, peer: PeerId) -> &SyncEngine<SimWorld> {
        &self.peers[&peer]
    }

    /// # Panics
    /// If `peer` is not in the mesh.
    pub fn engine_mut(&mut self, peer: PeerId) -> &mut SyncEngine<SimWorld> {
        self.peers.get_mut(&peer).expect("peer in mesh")
    }

    pub fn world(&self, peer: PeerId) -> &SimWorld {
        self.engine(peer).services()
    }

    pub fn world_mut(&mut self, peer: PeerId) -> &mut SimWorld {
        self.engine_mut(peer).services_mut()
    }

    /// Every delivery since the mesh was created.
    pub fn log(&self) -> &[Delivery] {
        &self.log
    }

    pub fn deliveries_of(&self, kind: MessageKind) -> Vec<&Delivery> {
        self.log.iter().filter(|d| d.kind == kind).collect()
    }

    /// Advances every peer by `dt`, then settles.
    pub fn tick(&mut self, dt: f32) -> anyhow::Result<usize> {
        for engine in self.peers.values_mut() {
            engine.fixed_update(dt);
            engine.update(dt)?;
        }
        self.settle()
    }

    /// Pumps local events and delivers frames until nothing is in flight.
    /// Returns the number of frames delivered.
    pub fn settle(&mut self) -> anyhow::Result<usize> {
        let mut delivered = 0;
        loop {
            self.collect_outgoing()?;
            let Some(next) = self.in_flight.pop_front() else {
                return Ok(delivered);
            };
            if delivered >= MAX_DELIVERIES {
                anyhow::bail!("mesh did not settle after {MAX_DELIVERIES} deliveries");
            }
            self.deliver(next)?;
            delivered += 1;
        }
    }

    fn collect_outgoing(&mut self) -> anyhow::Result<()> {
        let host = self.host;
        let joiners: Vec<PeerId> = self.peers.keys().copied().filter(|p| *p != host).collect();
        for (peer, engine) in self.peers.iter_mut() {
            engine.pump_local_events()?;
            for out in engine.drain_outbox() {
                let targets = if *peer == host {
                    match out.target {
                        Target::All => joiners.clone(),
                        Target::Peer(p) if joiners.contains(&p) => vec![p],
                        Target::Host | Target::Peer(_) => Vec::new(),
                    }
                } else {
                    match out.target {
                        Target::All | Target::Host => vec![host],
                        Target::Peer(p) if p == host => vec![host],
                        Target::Peer(_) => Vec::new(),
                    }
                };
                for to in targets {
                    self.in_flight.push_back(InFlight {
                        link: *peer,
                        to,
                        frame: out.frame.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn deliver(&mut self, flight: InFlight) -> anyhow::Result<()> {
        let Some(engine) = self.peers.get_mut(&flight.to) else {
            return Ok(());
        };
        let frame = Frame::decode(flight.frame.encode()).context("wire decode")?;
        let outcome = engine
            .dispatch_frame(&frame)
            .with_context(|| format!("{} handling {:?} from {}", flight.to, frame.kind, frame.sender))?;

        self.log.push(Delivery {
            from: frame.sender,
            to: flight.to,
            kind: frame.kind,
            outcome: outcome.clone(),
        });

        if flight.to == self.host && frame.kind.is_relayed() && !matches!(outcome, Outcome::Dropped(_)) {
            for peer in self.peers.keys() {
                if *peer != self.host && *peer != flight.link {
                    self.in_flight.push_back(InFlight {
                        link: self.host,
                        to: *peer,
                        frame: frame.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

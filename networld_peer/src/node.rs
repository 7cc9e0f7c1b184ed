//! Peer node.
//!
//! Hosts or joins a session over TCP and drives a [`SyncEngine`] over a
//! simulated world. The topology is a star: joiners talk only to the host,
//! and the host relays their world traffic to everybody else.
//!
//! Each connection gets a reader task that forwards frames into one channel;
//! the node drains it once per tick, so the engine is only ever touched from
//! the tick loop.

use std::{collections::BTreeMap, net::SocketAddr, time::Duration};

use anyhow::Context;
use networld_shared::{
    config::SyncConfig,
    event::local_event_channel,
    ids::PeerId,
    messages::{Hello, MessageKind, NetMessage, PeerJoined, PeerLeft, Welcome},
    net::{Frame, FrameConn, FrameListener, FrameReader, FrameWriter, PROTOCOL_VERSION},
    sim::SimWorld,
};
use networld_sync::{JoinState, Outcome, Outgoing, SessionRole, SessionSignal, SyncEngine, Target};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, warn};

/// How long a fresh connection may take to say hello.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Traffic from connection tasks to the tick loop.
enum Inbound {
    /// A joiner completed its hello; the node still owes it a welcome.
    Connected { peer: PeerId, name: String, conn: FrameConn },
    Frame { link: PeerId, frame: Frame },
    Closed { link: PeerId },
}

pub struct PeerNode {
    pub cfg: SyncConfig,
    engine: SyncEngine<SimWorld>,
    /// Host: one writer per joiner. Joiner: the host's writer only.
    links: BTreeMap<PeerId, FrameWriter>,
    host: PeerId,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    local_addr: Option<SocketAddr>,
    tick: u64,
}

impl PeerNode {
    /// Binds the listener and starts accepting joiners in the background.
    pub async fn host(cfg: SyncConfig, local_peer: PeerId, mut world: SimWorld) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.host_addr.parse().context("parse host_addr")?;
        let listener = FrameListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = local_event_channel();
        world.attach_events(events_tx);
        let mut engine = SyncEngine::new(world, &cfg, SessionRole::Host, local_peer, events_rx)?;
        engine.on_world_load()?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(accept_loop(listener, inbound_tx.clone()));

        info!(peer = %local_peer, %local_addr, "Hosting session");
        Ok(Self {
            cfg,
            engine,
            links: BTreeMap::new(),
            host: local_peer,
            inbound_tx,
            inbound_rx,
            local_addr: Some(local_addr),
            tick: 0,
        })
    }

    /// Connects to `cfg.host_addr`, completes the hello/welcome exchange and
    /// requests the world state.
    pub async fn join(cfg: SyncConfig, local_peer: PeerId, mut world: SimWorld) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.host_addr.parse().context("parse host_addr")?;
        let mut conn = FrameConn::connect(addr).await?;

        let hello = Hello {
            protocol: PROTOCOL_VERSION,
            name: cfg.player_name.clone(),
        };
        conn.send(&Frame::from_message(local_peer, &hello)?).await?;
        let reply = conn.recv().await.context("await welcome")?;
        let welcome: Welcome = reply.decode_message().context("expected Welcome")?;

        world.add_participant(welcome.host);
        for peer in &welcome.peers {
            world.add_participant(*peer);
        }
        let (events_tx, events_rx) = local_event_channel();
        world.attach_events(events_tx);
        let mut engine = SyncEngine::new(world, &cfg, SessionRole::Joiner, local_peer, events_rx)?;
        engine.on_world_load()?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (reader, writer) = conn.into_split();
        spawn_reader(welcome.host, reader, inbound_tx.clone());

        let mut links = BTreeMap::new();
        links.insert(welcome.host, writer);

        engine.begin_join();
        info!(peer = %local_peer, host = %welcome.host, others = welcome.peers.len(), "Joined session");
        Ok(Self {
            cfg,
            engine,
            links,
            host: welcome.host,
            inbound_tx,
            inbound_rx,
            local_addr: None,
            tick: 0,
        })
    }

    pub fn engine(&self) -> &SyncEngine<SimWorld> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine<SimWorld> {
        &mut self.engine
    }

    pub fn world(&self) -> &SimWorld {
        self.engine.services()
    }

    /// Local actions go through here so they are reported to the engine.
    pub fn world_mut(&mut self) -> &mut SimWorld {
        self.engine.services_mut()
    }

    pub fn local_peer(&self) -> PeerId {
        self.engine.local_peer()
    }

    pub fn is_host(&self) -> bool {
        self.engine.is_host()
    }

    /// Listening address; only hosts have one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn join_state(&self) -> JoinState {
        self.engine.join_state()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Runs the node for a number of ticks at the configured rate.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(self.cfg.tick_dt());
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// One tick: inbound traffic, local events and timers, then outbound
    /// traffic. An error is fatal for the session.
    pub async fn step(&mut self, dt: f32) -> anyhow::Result<()> {
        self.recv_inbound().await?;
        self.engine.fixed_update(dt);
        self.engine.update(dt).context("local update")?;
        for signal in self.engine.drain_signals() {
            match signal {
                SessionSignal::WorldLoaded { host } => {
                    info!(%host, pickupables = self.engine.world().pickupables().len(), "World loaded from host");
                }
            }
        }
        self.flush_outbox().await;
        self.tick += 1;
        Ok(())
    }

    async fn recv_inbound(&mut self) -> anyhow::Result<()> {
        while let Ok(inbound) = self.inbound_rx.try_recv() {
            match inbound {
                Inbound::Connected { peer, name, conn } => self.on_connected(peer, name, conn).await,
                Inbound::Frame { link, frame } => self.on_frame(link, frame).await?,
                Inbound::Closed { link } => self.on_closed(link).await,
            }
        }
        Ok(())
    }

    async fn on_connected(&mut self, peer: PeerId, name: String, conn: FrameConn) {
        if peer == self.local_peer() || self.links.contains_key(&peer) {
            warn!(%peer, "Rejecting duplicate peer id");
            return;
        }
        let welcome = Welcome {
            host: self.local_peer(),
            peers: self.links.keys().copied().collect(),
        };
        let (reader, mut writer) = conn.into_split();
        if let Err(e) = send_message(&mut writer, self.local_peer(), &welcome).await {
            warn!(%peer, error = %e, "Failed to welcome peer");
            return;
        }

        self.broadcast_session(&PeerJoined { peer }).await;
        self.world_mut().add_participant(peer);
        spawn_reader(peer, reader, self.inbound_tx.clone());
        self.links.insert(peer, writer);
        info!(%peer, %name, peers = self.links.len(), "Peer connected");
    }

    async fn on_frame(&mut self, link: PeerId, frame: Frame) -> anyhow::Result<()> {
        if self.is_host() && frame.sender != link {
            warn!(%link, claimed = %frame.sender, "Sender does not match connection, dropped");
            return Ok(());
        }

        if frame.kind.is_session() {
            self.on_session_frame(&frame);
            return Ok(());
        }

        let outcome = self
            .engine
            .dispatch_frame(&frame)
            .with_context(|| format!("fatal error handling {:?} from {}", frame.kind, frame.sender))?;

        if self.is_host() && frame.kind.is_relayed() && !matches!(outcome, Outcome::Dropped(_)) {
            self.relay(link, &frame).await;
        }
        Ok(())
    }

    fn on_session_frame(&mut self, frame: &Frame) {
        if self.is_host() {
            debug!(kind = ?frame.kind, sender = %frame.sender, "Ignoring session message from joiner");
            return;
        }
        match frame.kind {
            MessageKind::PeerJoined => match frame.decode_message::<PeerJoined>() {
                Ok(msg) => {
                    self.world_mut().add_participant(msg.peer);
                    info!(peer = %msg.peer, "Peer joined session");
                }
                Err(e) => warn!(error = %e, "Malformed PeerJoined"),
            },
            MessageKind::PeerLeft => match frame.decode_message::<PeerLeft>() {
                Ok(msg) => {
                    self.world_mut().remove_participant(msg.peer);
                    info!(peer = %msg.peer, "Peer left session");
                }
                Err(e) => warn!(error = %e, "Malformed PeerLeft"),
            },
            other => debug!(kind = ?other, "Unexpected session message"),
        }
    }

    async fn on_closed(&mut self, link: PeerId) {
        self.drop_links(vec![link]).await;
    }

    async fn relay(&mut self, from: PeerId, frame: &Frame) {
        let failed = self.send_to_links(frame, Some(from)).await;
        self.drop_links(failed).await;
    }

    async fn broadcast_session<M: NetMessage>(&mut self, msg: &M) {
        match Frame::from_message(self.local_peer(), msg) {
            Ok(frame) => {
                let failed = self.send_to_links(&frame, None).await;
                self.drop_links(failed).await;
            }
            Err(e) => error!(kind = ?M::KIND, error = %e, "Failed to encode session message"),
        }
    }

    /// Sends `frame` on every link but `except`; returns the links that
    /// failed.
    async fn send_to_links(&mut self, frame: &Frame, except: Option<PeerId>) -> Vec<PeerId> {
        let mut failed = Vec::new();
        for (peer, writer) in self.links.iter_mut() {
            if Some(*peer) == except {
                continue;
            }
            if let Err(e) = writer.send(frame).await {
                warn!(%peer, kind = ?frame.kind, error = %e, "Send failed");
                failed.push(*peer);
            }
        }
        failed
    }

    async fn flush_outbox(&mut self) {
        let outgoing = self.engine.drain_outbox();
        let mut failed = Vec::new();
        for Outgoing { target, frame, .. } in outgoing {
            for peer in self.route(target) {
                if failed.contains(&peer) {
                    continue;
                }
                let Some(writer) = self.links.get_mut(&peer) else {
                    continue;
                };
                if let Err(e) = writer.send(&frame).await {
                    warn!(%peer, kind = ?frame.kind, error = %e, "Send failed");
                    failed.push(peer);
                }
            }
        }
        self.drop_links(failed).await;
    }

    /// Links a frame for `target` goes out on.
    fn route(&self, target: Target) -> Vec<PeerId> {
        match target {
            Target::All => self.links.keys().copied().collect(),
            Target::Host if self.is_host() => Vec::new(),
            Target::Host => vec![self.host],
            Target::Peer(peer) if self.links.contains_key(&peer) => vec![peer],
            Target::Peer(peer) => {
                warn!(%peer, "No route to peer, message not sent");
                Vec::new()
            }
        }
    }

    /// Tears down dead links. On the host every departure is announced to
    /// the remaining peers, which may surface further dead links.
    async fn drop_links(&mut self, mut pending: Vec<PeerId>) {
        while let Some(link) = pending.pop() {
            if self.links.remove(&link).is_none() {
                continue;
            }
            if !self.is_host() {
                self.engine.leave_session();
                warn!(host = %link, "Lost connection to host");
                continue;
            }
            self.world_mut().remove_participant(link);
            info!(peer = %link, peers = self.links.len(), "Peer disconnected");
            match Frame::from_message(self.local_peer(), &PeerLeft { peer: link }) {
                Ok(frame) => pending.extend(self.send_to_links(&frame, None).await),
                Err(e) => error!(error = %e, "Failed to encode PeerLeft"),
            }
        }
    }
}

async fn send_message<M: NetMessage>(writer: &mut FrameWriter, sender: PeerId, msg: &M) -> anyhow::Result<()> {
    let frame = Frame::from_message(sender, msg)?;
    writer.send(&frame).await
}

async fn accept_loop(listener: FrameListener, tx: mpsc::UnboundedSender<Inbound>) {
    loop {
        let (conn, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        let task_tx = tx.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_hello(conn)).await {
                Ok(Ok((peer, name, conn))) => {
                    let _ = task_tx.send(Inbound::Connected { peer, name, conn });
                }
                Ok(Err(e)) => warn!(%addr, error = %e, "Handshake failed"),
                Err(_) => warn!(%addr, "Handshake timed out"),
            }
        });
        if tx.is_closed() {
            break;
        }
    }
}

async fn read_hello(mut conn: FrameConn) -> anyhow::Result<(PeerId, String, FrameConn)> {
    let frame = conn.recv().await?;
    let hello: Hello = frame.decode_message().context("expected Hello")?;
    if hello.protocol != PROTOCOL_VERSION {
        anyhow::bail!("protocol mismatch: peer {}, ours {}", hello.protocol, PROTOCOL_VERSION);
    }
    Ok((frame.sender, hello.name, conn))
}

fn spawn_reader(link: PeerId, mut reader: FrameReader, tx: mpsc::UnboundedSender<Inbound>) {
    tokio::spawn(async move {
        loop {
            match reader.recv().await {
                Ok(frame) => {
                    if tx.send(Inbound::Frame { link, frame }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(%link, error = %e, "Connection closed");
                    let _ = tx.send(Inbound::Closed { link });
                    break;
                }
            }
        }
    });
}

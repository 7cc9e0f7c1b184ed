//! Standalone peer binary.
//!
//! Usage:
//!   cargo run -p networld_peer -- --host [--addr 127.0.0.1:40000] [--name Teimo]
//!   cargo run -p networld_peer -- --join [--addr 127.0.0.1:40000] [--name Pena]
//!
//! Options:
//!   --config <path>   JSON session config (overridden by the flags below)
//!   --addr <host:port>
//!   --tick-hz <hz>
//!   --name <name>
//!
//! Console commands:
//!   status                    - Show session status
//!   spawn <prefab>            - Spawn a pickupable next to the player
//!   destroy <net id>          - Destroy a pickupable
//!   door <index> [open|close] - Toggle a door
//!   light <index> [on|off]    - Toggle a light switch
//!   quit                      - Leave the session

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use networld_peer::PeerNode;
use networld_shared::{
    config::SyncConfig,
    ids::PeerId,
    math::{Transform, Vec3},
    sim::{SimWorld, PREFAB_BEER_CASE, PREFAB_BOTTLE, PREFAB_SAUSAGES},
};
use tokio::sync::mpsc;
use tracing::{error, info};

struct Args {
    host: bool,
    config: Option<PathBuf>,
    addr: Option<String>,
    tick_hz: Option<u32>,
    name: Option<String>,
}

fn parse_args() -> Args {
    let mut out = Args {
        host: false,
        config: None,
        addr: None,
        tick_hz: None,
        name: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                out.host = true;
                i += 1;
            }
            "--join" => {
                out.host = false;
                i += 1;
            }
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                out.tick_hz = args[i + 1].parse().ok();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                out.name = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

fn load_config(args: &Args) -> anyhow::Result<SyncConfig> {
    let mut cfg = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if let Some(addr) = &args.addr {
        cfg.host_addr = addr.clone();
    }
    if let Some(hz) = args.tick_hz {
        cfg.tick_hz = hz.max(1);
    }
    if let Some(name) = &args.name {
        cfg.player_name = name.clone();
    }
    Ok(cfg)
}

/// The host's farm starts with some groceries lying around.
fn stocked_world(peer: PeerId, cfg: &SyncConfig) -> SimWorld {
    let mut world = SimWorld::standard(peer, &cfg.vehicle_kinds);
    world.place_object(PREFAB_BEER_CASE, Transform::at(Vec3::new(-8.0, 0.6, 9.0)));
    for i in 0..3 {
        let spot = Vec3::new(-8.5 + 0.3 * i as f32, 0.9, 9.5);
        world.place_object(PREFAB_BOTTLE, Transform::at(spot));
    }
    world.place_object(PREFAB_SAUSAGES, Transform::at(Vec3::new(-9.4, 0.9, 10.2)));
    world
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let cfg = load_config(&args).context("load config")?;
    let peer = PeerId(rand::random());
    info!(%peer, addr = %cfg.host_addr, host = args.host, "Starting peer");

    let mut node = if args.host {
        let world = stocked_world(peer, &cfg);
        PeerNode::host(cfg.clone(), peer, world).await.context("host session")?
    } else {
        let world = SimWorld::standard(peer, &cfg.vehicle_kinds);
        PeerNode::join(cfg.clone(), peer, world).await.context("join session")?
    };

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Type 'status' for info, 'quit' to exit.");

    loop {
        while let Ok(line) = console_rx.try_recv() {
            if line == "quit" {
                info!("Leaving session");
                return Ok(());
            }
            match node.exec_console(&line) {
                Ok(output) => {
                    for line in output {
                        println!("{}", line);
                    }
                }
                Err(e) => println!("Error: {}", e),
            }
        }

        if let Err(e) = node.run_for_ticks(1).await {
            error!(error = %format!("{e:#}"), "Session aborted");
            return Err(e);
        }

        if !node.is_host() && node.link_count() == 0 {
            println!("Disconnected from host.");
            break;
        }
    }

    Ok(())
}

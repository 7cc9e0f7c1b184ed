//! Operator console for a running node.
//!
//! Commands act on the local simulated world through its reporting helpers,
//! so every change flows through the engine like a player action would.

use anyhow::Context;
use networld_shared::{
    ids::{PickupableId, PrefabId},
    math::{Transform, Vec3},
    services::{Environment, Fixtures},
};

use crate::node::PeerNode;

impl PeerNode {
    /// Executes one console line and returns the lines to print.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(Vec::new());
        };
        let args: Vec<&str> = parts.collect();

        match cmd {
            "status" => Ok(self.status_lines()),
            "spawn" => {
                let prefab: u32 = args.first().context("usage: spawn <prefab>")?.parse().context("prefab id")?;
                let prefab = PrefabId(prefab);
                if self.world().prefab(prefab).is_none() {
                    anyhow::bail!("unknown prefab {prefab}");
                }
                let spot = Vec3::new(-9.0, 0.5, 10.0);
                let object = self.world_mut().spawn_local(prefab, Transform::at(spot));
                Ok(vec![format!("spawned {object}")])
            }
            "destroy" => {
                let id: u16 = args.first().context("usage: destroy <net id>")?.parse().context("net id")?;
                let rec = self
                    .engine()
                    .world()
                    .pickupables()
                    .get(PickupableId(id))
                    .copied()
                    .with_context(|| format!("no pickupable {id}"))?;
                self.world_mut().destroy_local(rec.object);
                Ok(vec![format!("destroyed {}", rec.id)])
            }
            "door" => {
                let index: usize = args.first().context("usage: door <index> [open|close]")?.parse().context("door index")?;
                let door = *self.world().doors().get(index).with_context(|| format!("no door {index}"))?;
                let open = match args.get(1) {
                    Some(&"open") => true,
                    Some(&"close") => false,
                    _ => !door.open,
                };
                self.world_mut().open_door_local(door.position, open);
                Ok(vec![format!("door {index} {}", if open { "opened" } else { "closed" })])
            }
            "light" => {
                let index: usize = args.first().context("usage: light <index> [on|off]")?.parse().context("light index")?;
                let light = *self.world().lights().get(index).with_context(|| format!("no light {index}"))?;
                let on = match args.get(1) {
                    Some(&"on") => true,
                    Some(&"off") => false,
                    _ => !light.on,
                };
                self.world_mut().toggle_light_local(light.position, on);
                Ok(vec![format!("light {index} {}", if on { "on" } else { "off" })])
            }
            other => anyhow::bail!("unknown command: {other}"),
        }
    }

    fn status_lines(&self) -> Vec<String> {
        let engine = self.engine();
        let global = self.world().global_state();
        vec![
            format!(
                "peer {} ({})",
                self.local_peer(),
                if self.is_host() { "host" } else { "joiner" }
            ),
            format!("join state: {:?}", self.join_state()),
            format!("links: {}", self.link_count()),
            format!("tick: {}", self.tick()),
            format!("time: {:.2} day {} weather {:?}", global.time_of_day, global.day, global.weather.kind),
            format!("pickupables: {}", engine.world().pickupables().len()),
            format!("vehicles: {}", engine.world().vehicles().len()),
        ]
    }
}

//! Configuration system.
//!
//! Loads session configuration from JSON strings/files.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Vehicles every participant registers, in net id order.
pub const DEFAULT_VEHICLE_KINDS: &[&str] = &[
    "JONNEZ ES(Clone)",
    "HAYOSIKO(1500kg, 250)",
    "SATSUMA(557kg, 248)",
    "RCO_RUSCKO12(270)",
    "KEKMET(350-400psi)",
    "FLATBED",
    "FERNDALE(1630kg)",
    "GIFU(750/450psi)",
];

/// Root configuration shared by host and joiners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Host listen address, e.g. `127.0.0.1:40000`. Joiners connect here.
    pub host_addr: String,
    /// Simulation tick rate.
    pub tick_hz: u32,
    /// Seconds between host heartbeats of time/day/weather.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: f32,
    /// Declared vehicle kinds; order defines vehicle net ids.
    #[serde(default = "default_vehicle_kinds")]
    pub vehicle_kinds: Vec<String>,
    /// Display name sent in the handshake.
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

fn default_heartbeat_interval() -> f32 {
    10.0
}

fn default_vehicle_kinds() -> Vec<String> {
    DEFAULT_VEHICLE_KINDS.iter().map(|k| k.to_string()).collect()
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 60,
            heartbeat_interval: default_heartbeat_interval(),
            vehicle_kinds: default_vehicle_kinds(),
            player_name: default_player_name(),
        }
    }
}

impl SyncConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Seconds per simulation tick.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }
}

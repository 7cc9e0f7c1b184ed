//! Wire message catalogue.
//!
//! Every message is a plain serde struct bound to exactly one
//! [`MessageKind`]. The kind travels in the frame header (see
//! [`crate::net::Frame`]); the struct is the JSON payload.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    ids::{PeerId, PickupableId, PrefabId, VehicleId},
    math::{Transform, Vec3},
    net::SendFlags,
    state::{DoorState, EngineState, LightState, SpawnState, Weather},
};

/// Discriminant of every message that can appear in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    // ─── Session ───
    Hello = 0,
    Welcome = 1,
    PeerJoined = 2,
    PeerLeft = 3,

    // ─── Join ───
    AskForWorldState = 10,
    FullWorldSync = 11,

    // ─── Global state ───
    WorldPeriodicalUpdate = 20,
    OpenDoors = 21,
    LightSwitch = 22,

    // ─── Pickupables ───
    PickupableSpawn = 30,
    PickupableActivate = 31,
    PickupableDestroy = 32,
    PickupableSetPosition = 33,
    RemoveBottle = 34,
    PickupObject = 35,
    ReleaseObject = 36,

    // ─── Players & vehicles ───
    PlayerSync = 40,
    VehicleEnter = 41,
    VehicleLeave = 42,
    VehicleSync = 43,
    VehicleState = 44,
    VehicleSwitch = 45,
}

impl MessageKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        use MessageKind::*;
        Some(match v {
            0 => Hello,
            1 => Welcome,
            2 => PeerJoined,
            3 => PeerLeft,
            10 => AskForWorldState,
            11 => FullWorldSync,
            20 => WorldPeriodicalUpdate,
            21 => OpenDoors,
            22 => LightSwitch,
            30 => PickupableSpawn,
            31 => PickupableActivate,
            32 => PickupableDestroy,
            33 => PickupableSetPosition,
            34 => RemoveBottle,
            35 => PickupObject,
            36 => ReleaseObject,
            40 => PlayerSync,
            41 => VehicleEnter,
            42 => VehicleLeave,
            43 => VehicleSync,
            44 => VehicleState,
            45 => VehicleSwitch,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Session-layer kinds are consumed by the peer node, never by the world
    /// router.
    pub fn is_session(self) -> bool {
        matches!(
            self,
            MessageKind::Hello | MessageKind::Welcome | MessageKind::PeerJoined | MessageKind::PeerLeft
        )
    }

    /// Kinds that belong to the join handshake itself and may be processed
    /// before the receiver is synchronized.
    pub fn is_join(self) -> bool {
        matches!(self, MessageKind::AskForWorldState | MessageKind::FullWorldSync)
    }

    /// Whether a host forwards this kind from one joiner to the others.
    pub fn is_relayed(self) -> bool {
        !self.is_session() && !self.is_join()
    }

    /// High-rate state streams go unreliable; everything else must arrive.
    pub fn send_flags(self) -> SendFlags {
        match self {
            MessageKind::PlayerSync | MessageKind::VehicleSync => SendFlags::NONE,
            _ => SendFlags::RELIABLE | SendFlags::ORDERED,
        }
    }
}

/// A typed wire message.
pub trait NetMessage: Serialize + DeserializeOwned + std::fmt::Debug + 'static {
    const KIND: MessageKind;
}

macro_rules! net_message {
    ($ty:ident) => {
        impl NetMessage for $ty {
            const KIND: MessageKind = MessageKind::$ty;
        }
    };
}

// ─── Session ───

/// Joiner -> host: first frame on a fresh connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub protocol: u32,
    pub name: String,
}

/// Host -> joiner: handshake accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub host: PeerId,
    /// Other participants already in the session.
    pub peers: Vec<PeerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerJoined {
    pub peer: PeerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerLeft {
    pub peer: PeerId,
}

net_message!(Hello);
net_message!(Welcome);
net_message!(PeerJoined);
net_message!(PeerLeft);

// ─── Pickupables ───

/// Create-or-resynchronize a pickupable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupableSpawn {
    pub id: PickupableId,
    pub prefab: PrefabId,
    pub transform: Transform,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_data: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupableActivate {
    pub id: PickupableId,
    pub activate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupableDestroy {
    pub id: PickupableId,
}

/// Absolute world-space position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupableSetPosition {
    pub id: PickupableId,
    pub position: Vec3,
}

/// One unit consumed from a container pickupable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveBottle {
    pub net_id: PickupableId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupObject {
    pub net_id: PickupableId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseObject {
    /// `true` when dropped, `false` when thrown.
    pub drop: bool,
}

net_message!(PickupableSpawn);
net_message!(PickupableActivate);
net_message!(PickupableDestroy);
net_message!(PickupableSetPosition);
net_message!(RemoveBottle);
net_message!(PickupObject);
net_message!(ReleaseObject);

// ─── Global state ───

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPeriodicalUpdate {
    /// Whole hour as reported by the sun clock.
    pub sun_clock: u8,
    pub world_day: u8,
    pub weather: Weather,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenDoors {
    pub position: Vec3,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSwitch {
    pub position: Vec3,
    pub toggle: bool,
}

net_message!(WorldPeriodicalUpdate);
net_message!(OpenDoors);
net_message!(LightSwitch);

// ─── Players & vehicles ───

/// Avatar movement stream. Opaque to the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSync {
    pub transform: Transform,
    #[serde(default)]
    pub crouching: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleEnter {
    pub vehicle_id: VehicleId,
    pub passenger: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VehicleLeave {}

/// Driver input stream for the vehicle the sender occupies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSync {
    pub transform: Transform,
    pub steering: f32,
    pub throttle: f32,
    pub brake: f32,
    pub clutch: f32,
    pub fuel: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hydraulic: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: VehicleId,
    pub state: EngineState,
    pub dash_state: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSwitch {
    pub vehicle_id: VehicleId,
    pub switch_id: u8,
    pub switch_value: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub float_value: Option<f32>,
}

net_message!(PlayerSync);
net_message!(VehicleEnter);
net_message!(VehicleLeave);
net_message!(VehicleSync);
net_message!(VehicleState);
net_message!(VehicleSwitch);

// ─── Join ───

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AskForWorldState {}

/// Vehicle entry of a world snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInit {
    pub id: VehicleId,
    pub transform: Transform,
}

/// Complete world snapshot answered to a join request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullWorldSync {
    pub day_time: f32,
    pub day: i32,
    pub mailbox_name: String,
    pub doors: Vec<DoorState>,
    pub lights: Vec<LightState>,
    pub weather: Weather,
    pub vehicles: Vec<VehicleInit>,
    pub pickupables: Vec<PickupableSpawn>,
    pub spawn_state: SpawnState,
}

net_message!(AskForWorldState);
net_message!(FullWorldSync);

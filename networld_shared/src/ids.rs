//! Identity newtypes.
//!
//! Net ids (`VehicleId`, `PickupableId`) are what peers agree on; `ObjectRef`
//! is a local handle into the scene and never crosses the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a session participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl PeerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Net id of a vehicle. Assigned in declared order at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u8);

impl VehicleId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Net id of a pickupable object.
///
/// Valid ids are `0..PickupableId::INVALID`; the sentinel itself is never
/// registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PickupableId(pub u16);

impl PickupableId {
    pub const INVALID: PickupableId = PickupableId(u16::MAX);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for PickupableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a pickupable template in the prefab catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrefabId(pub u32);

impl fmt::Display for PrefabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a scene object owned by the engine's scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub u64);

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pickupable_sentinel() {
        assert!(!PickupableId::INVALID.is_valid());
        assert!(PickupableId(0).is_valid());
        assert!(PickupableId(u16::MAX - 1).is_valid());
    }

    #[test]
    fn peer_id_display_is_fixed_width_hex() {
        assert_eq!(PeerId(0xab).to_string(), "00000000000000ab");
    }
}

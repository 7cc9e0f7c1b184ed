//! Local simulation events.
//!
//! The scene collaborator reports what happened locally through a
//! [`LocalEventSender`]; the sync engine drains the matching
//! [`LocalEventReceiver`] once per tick and turns each event into at most one
//! outbound message.

use tokio::sync::mpsc;
use tracing::trace;

use crate::{
    ids::{ObjectRef, VehicleId},
    math::Vec3,
    messages::{PlayerSync, VehicleSync},
    state::EngineState,
};

/// Coordinate frame of a position-set event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Space {
    World,
    /// Relative to `origin`, the object's world position when the move was
    /// requested.
    Local { origin: Vec3 },
}

/// Something that changed in the local simulation.
///
/// Events are reported after the scene applied the change and are seen by the
/// engine on its next pump, so anything that depends on the pre-change state
/// travels in the event itself.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    ObjectSpawned {
        object: ObjectRef,
    },
    ObjectActivation {
        object: ObjectRef,
        activate: bool,
    },
    ObjectDestroyed {
        object: ObjectRef,
    },
    ObjectPositionSet {
        object: ObjectRef,
        position: Vec3,
        space: Space,
    },
    DoorToggled {
        position: Vec3,
        open: bool,
    },
    LightToggled {
        position: Vec3,
        on: bool,
    },
    BottleConsumed {
        object: ObjectRef,
    },
    ObjectPickedUp {
        object: ObjectRef,
    },
    ObjectReleased {
        drop: bool,
    },
    VehicleEntered {
        vehicle: VehicleId,
        passenger: bool,
    },
    VehicleLeft,
    VehicleEngineChanged {
        vehicle: VehicleId,
        state: EngineState,
        dash_state: i32,
        start_time: Option<f32>,
    },
    VehicleSwitchChanged {
        vehicle: VehicleId,
        switch_id: u8,
        value: bool,
        float_value: Option<f32>,
    },
    PlayerMoved(PlayerSync),
    VehicleDriven(VehicleSync),
}

/// Producer side, cloned into every collaborator that reports events.
#[derive(Debug, Clone)]
pub struct LocalEventSender {
    tx: mpsc::UnboundedSender<LocalEvent>,
}

impl LocalEventSender {
    pub fn send(&self, event: LocalEvent) {
        if self.tx.send(event).is_err() {
            trace!("local event dropped, engine is gone");
        }
    }
}

/// Consumer side, owned by the sync engine.
#[derive(Debug)]
pub struct LocalEventReceiver {
    rx: mpsc::UnboundedReceiver<LocalEvent>,
}

impl LocalEventReceiver {
    /// Takes every event queued so far without waiting.
    pub fn drain(&mut self) -> Vec<LocalEvent> {
        let mut out = Vec::new();
        while let Ok(e) = self.rx.try_recv() {
            out.push(e);
        }
        out
    }
}

/// Creates a connected sender/receiver pair.
pub fn local_event_channel() -> (LocalEventSender, LocalEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LocalEventSender { tx }, LocalEventReceiver { rx })
}

//! `networld_sync`
//!
//! World synchronization engine:
//! - Identity registry (vehicles, pickupables)
//! - Message router
//! - Full-world snapshot codec
//! - Update emitter and host heartbeat
//! - Join protocol
//!
//! The engine is transport-agnostic: frames go in through
//! [`SyncEngine::dispatch_frame`] and come out of [`SyncEngine::drain_outbox`].
//! All world access goes through the collaborator traits in
//! `networld_shared::services`.

pub mod emitter;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod join;
pub mod outbox;
pub mod registry;
pub mod router;
pub mod snapshot;
pub mod world;

pub use engine::SyncEngine;
pub use error::{Anomaly, Outcome, SyncError};
pub use join::{JoinState, SessionSignal};
pub use outbox::{Outgoing, Target};
pub use world::{NetWorld, SessionRole};

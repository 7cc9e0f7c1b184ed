//! `networld_shared`
//!
//! Types shared by the sync engine, the peer node and the tests.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (ids, wire messages, framing, events, collaborators).
//! - Traits for abstraction and dependency injection.
//! - No `unsafe`.

pub mod config;
pub mod event;
pub mod ids;
pub mod math;
pub mod messages;
pub mod net;
pub mod services;
pub mod sim;
pub mod state;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::event::*;
    pub use crate::ids::*;
    pub use crate::math::*;
    pub use crate::messages::{MessageKind, NetMessage};
    pub use crate::net::{Frame, SendFlags, PROTOCOL_VERSION};
    pub use crate::services::*;
    pub use crate::state::*;
}

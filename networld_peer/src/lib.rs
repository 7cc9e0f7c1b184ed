//! `networld_peer`
//!
//! Session plumbing around the sync engine:
//! - TCP listener and connector with a hello/welcome handshake
//! - Star relay of world traffic through the host
//! - Fixed-rate tick loop driving a simulated world
//! - Operator console

pub mod console;
pub mod node;

pub use node::PeerNode;

//! Ground-side command link for the Skylink vehicle agent.
//!
//! One module: [`client`], the persistent WebSocket command client the
//! operator console (and the browser-facing proxy outside this crate) talk
//! through.

pub mod client;

pub use client::{CommandClient, EventKind};

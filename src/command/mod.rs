//! Vehicle-side command channel: WebSocket server plus handler wiring

pub mod handlers;
mod server;

pub use server::{CommandHandler, CommandServer, PeerHook};

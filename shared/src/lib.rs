//! Skylink Shared Protocol Types
//!
//! This crate provides the command registry, envelope validation and
//! connection-state types shared by the vehicle-side command server and the
//! ground-side command client. Keeping validation in one place guarantees
//! both endpoints accept and reject exactly the same frames.

pub mod command;
pub mod envelope;
pub mod error;

// Re-export commonly used types at crate root
pub use command::CommandType;
pub use envelope::Envelope;
pub use error::ProtocolError;

/// Connection state of a protocol endpoint.
///
/// Owned exclusively by its endpoint object. Transitions:
/// `Disconnected -> Connecting` on a connect request, `Connecting ->
/// Connected` when the transport opens, and any state back to `Disconnected`
/// on transport close, transport error, or an explicit close call. Sending is
/// permitted only while `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}

/// Wire parameters shared by both endpoints
pub mod wire {
    /// TCP port the vehicle-side command server listens on
    pub const COMMAND_PORT: u16 = 3128;
}

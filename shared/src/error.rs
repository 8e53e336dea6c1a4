//! Protocol-level error taxonomy
//!
//! Every failure the command channel can produce maps onto one of these
//! variants. Parse and malformed-command failures are fatal to the offending
//! message only; the connection that carried it stays open.

use thiserror::Error;

/// Errors raised by the command protocol layer
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Raw frame is not parseable as JSON at all
    #[error("Message is not valid JSON: {0}")]
    ParseCommand(String),

    /// Frame is JSON but not a valid command envelope
    #[error("Message is not a valid command: {0}")]
    MalformedCommand(String),

    /// Send refused: endpoint not connected, envelope invalid, or transport write failed
    #[error("Cannot send command: {0}")]
    SendCommand(String),

    /// Connection to the remote endpoint could not be established
    #[error("Communication with command server failed: {0}")]
    Communication(String),

    /// Handler slot name is not one of the recognized event kinds
    #[error("Unknown event kind: {0}")]
    RemoveHandler(String),
}

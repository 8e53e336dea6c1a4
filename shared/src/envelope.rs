//! Command envelope and wire validation
//!
//! One JSON text frame per command:
//! ```text
//! {"type": "<command name>", "body": <payload or null>}
//! ```
//!
//! Validation runs in two stages so the failure classes stay distinct: a
//! frame that is not JSON at all raises [`ProtocolError::ParseCommand`],
//! while JSON missing the `type`/`body` keys or naming an unknown type raises
//! [`ProtocolError::MalformedCommand`]. Client and server both validate
//! through this one path, so a frame rejected on either side is rejected on
//! both.

use serde_json::Value;

use crate::command::CommandType;
use crate::error::ProtocolError;

/// A validated command envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Command type, normalized to the registry enum
    pub kind: CommandType,
    /// Handler-defined payload, opaque to the protocol layer
    pub body: Value,
}

impl Envelope {
    /// Create an envelope with a structured body
    pub fn new(kind: CommandType, body: Value) -> Self {
        Self { kind, body }
    }

    /// Create an envelope with a null body (e.g. PING)
    pub fn empty(kind: CommandType) -> Self {
        Self {
            kind,
            body: Value::Null,
        }
    }

    /// Validate a raw text frame into an envelope
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::ParseCommand(e.to_string()))?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON value into an envelope.
    ///
    /// Valid iff both the `type` and `body` keys are present and `type` names
    /// a registry member. A null `body` is valid; an absent one is not.
    /// Unknown extra keys are ignored.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::MalformedCommand("frame is not a JSON object".into()))?;
        let kind = object
            .get("type")
            .ok_or_else(|| ProtocolError::MalformedCommand("missing `type` key".into()))?;
        let body = object
            .get("body")
            .ok_or_else(|| ProtocolError::MalformedCommand("missing `body` key".into()))?;
        let kind = kind
            .as_str()
            .ok_or_else(|| ProtocolError::MalformedCommand("`type` is not a string".into()))?
            .parse::<CommandType>()?;

        Ok(Self {
            kind,
            body: body.clone(),
        })
    }

    /// Serialize to the canonical wire text
    pub fn to_text(&self) -> String {
        serde_json::json!({ "type": self.kind, "body": self.body }).to_string()
    }
}

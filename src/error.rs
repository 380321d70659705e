use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced at the client boundary. None of them is fatal: the
/// caller logs and drops the offending input, keeping the last good state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum ClientError {
    /// Payload was not an event array (or batch object), or was empty.
    #[error("malformed event batch: {reason}")]
    MalformedBatch { reason: String },

    /// A snapshot, history or config payload failed to decode.
    #[error("could not decode {what}: {reason}")]
    Decode { what: String, reason: String },

    /// The session was torn down and no longer accepts input.
    #[error("session has been torn down")]
    SessionClosed,
}

impl ClientError {
    pub fn decode(what: impl Into<String>, error: impl std::fmt::Display) -> Self {
        ClientError::Decode {
            what: what.into(),
            reason: error.to_string(),
        }
    }
}

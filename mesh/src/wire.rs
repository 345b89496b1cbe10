//! Wire codec for the three envelope variants.
//!
//! Everything that crosses the transport is one [`Envelope`], serialized as
//! self-describing JSON. JSON over a radio link is not the most compact
//! choice, but the frames are small, every platform on the mesh can parse
//! it, and a schema mismatch between app versions fails loudly at decode
//! time instead of silently corrupting state.
//!
//! Malformed or unknown frames decode to [`DecodeError`]; the receiver logs
//! and drops them with no state change.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Message, MessageId};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One transport frame.
///
/// `DataMessage` is the payload path (flood broadcast or point-to-point
/// repair); `Inventory` and `RequestMissing` are the anti-entropy control
/// plane layered over the same channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Envelope {
    /// A mesh message, either flooded or sent in response to a
    /// `RequestMissing`.
    DataMessage { message: Box<Message> },

    /// "Here is everything I have" — the sender's full seen-id set.
    Inventory {
        #[serde(rename = "messageIds")]
        message_ids: BTreeSet<MessageId>,
    },

    /// "Send me these" — ids the sender saw in our inventory but lacks.
    RequestMissing {
        #[serde(rename = "missingIds")]
        missing_ids: BTreeSet<MessageId>,
    },
}

impl Envelope {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataMessage { .. } => "DataMessage",
            Self::Inventory { .. } => "Inventory",
            Self::RequestMissing { .. } => "RequestMissing",
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A frame that could not be decoded. Dropped and logged by the receiver;
/// never fatal and never a state change.
#[derive(Debug, Error)]
#[error("malformed envelope: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// An envelope that could not be serialized. Effectively unreachable for
/// well-formed engine state, but propagated rather than unwrapped.
#[derive(Debug, Error)]
#[error("envelope encode failed: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Serializes an envelope into a transport frame.
pub fn encode(envelope: &Envelope) -> Result<Bytes, EncodeError> {
    Ok(Bytes::from(serde_json::to_vec(envelope)?))
}

/// Parses a transport frame into an envelope.
pub fn decode(frame: &[u8]) -> Result<Envelope, DecodeError> {
    Ok(serde_json::from_slice(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageContent, Priority};

    fn sample_message() -> Message {
        Message::new(
            "room-7",
            "dev-x",
            "X",
            MessageContent::Sos {
                category: "MEDICAL".to_string(),
                description: "leg injury".to_string(),
                people_count: 2,
            },
            Priority::Critical,
        )
    }

    #[test]
    fn data_message_round_trips() {
        let env = Envelope::DataMessage {
            message: Box::new(sample_message()),
        };
        let frame = encode(&env).unwrap();
        assert_eq!(decode(&frame).unwrap(), env);
    }

    #[test]
    fn inventory_serializes_ids_deterministically() {
        let env = Envelope::Inventory {
            message_ids: ["m2", "m1", "m3"].iter().map(|s| s.to_string()).collect(),
        };
        let frame = encode(&env).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        // BTreeSet gives sorted, stable output.
        assert!(text.contains(r#"["m1","m2","m3"]"#));
        assert_eq!(decode(&frame).unwrap(), env);
    }

    #[test]
    fn request_missing_round_trips() {
        let env = Envelope::RequestMissing {
            missing_ids: ["m9"].iter().map(|s| s.to_string()).collect(),
        };
        let frame = encode(&env).unwrap();
        assert_eq!(decode(&frame).unwrap(), env);
    }

    #[test]
    fn garbage_frames_fail_to_decode() {
        assert!(decode(b"not json at all").is_err());
        assert!(decode(b"{}").is_err());
        assert!(decode(br#"{"FutureEnvelopeKind":{"x":1}}"#).is_err());
    }

    #[test]
    fn decode_error_reports_the_cause() {
        let err = decode(b"{").unwrap_err();
        assert!(err.to_string().starts_with("malformed envelope"));
    }
}

//! Engine error types.
//!
//! The engine distinguishes network weather (duplicates, undecodable
//! frames, vanished peers — all tolerated by design, see the per-module
//! error types) from programming-contract violations, which are the only
//! failures that propagate to the host. A contract violation means two
//! devices disagree about the schema, not that the radio hiccuped.

use thiserror::Error;

/// Failures surfaced by engine entry points.
///
/// [`EngineError::Decode`] is network weather: log it, drop the frame, move
/// on. Every other variant is a contract violation and should be treated as
/// fatal by the host.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A frame that could not be parsed into an envelope. Drop and log.
    #[error(transparent)]
    Decode(#[from] crate::wire::DecodeError),

    /// A message offered for creation carried an empty id.
    #[error("message id must not be empty")]
    EmptyMessageId,

    /// Creation was attempted on an engine bound to an empty room id.
    #[error("room id must not be empty")]
    EmptyRoomId,

    /// A message offered for creation named no sender.
    #[error("sender id must not be empty")]
    EmptySenderId,

    /// A message was offered to an engine bound to a different room.
    #[error("room mismatch: engine is in {engine_room}, message is for {message_room}")]
    RoomMismatch {
        engine_room: String,
        message_room: String,
    },
}

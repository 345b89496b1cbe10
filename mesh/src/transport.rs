//! Transport adapter contract.
//!
//! The engine never touches a radio. Bluetooth, Wi-Fi Direct, Multipeer
//! sessions, UDP multicast — all of that lives behind this narrow contract,
//! implemented by the host platform. The engine only needs three things:
//! send bytes somewhere, know who is currently reachable, and be told when
//! peers come and go.
//!
//! Receive is intentionally absent from the trait: the host owns each
//! connection's receive loop and funnels every frame into
//! [`crate::engine::Engine::handle_frame`]. That keeps the single-writer
//! discipline over engine state where it belongs.

use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Stable identifier for a directly connected peer device.
pub type PeerId = String;

/// Where a frame should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Point-to-point, used by anti-entropy greetings and repair responses.
    Peer(PeerId),
    /// Every currently connected peer, used by flood retransmission and
    /// periodic inventory broadcast.
    All,
}

/// A transport-level send failure.
///
/// Sends are fire-and-forget at this layer: callers log these at debug level
/// and move on. A frame lost to a vanished peer is re-supplied by redundant
/// flooding or the next anti-entropy round.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The addressed peer is no longer connected.
    #[error("peer not connected: {0}")]
    PeerUnavailable(PeerId),

    /// No peers at all; the frame went nowhere.
    #[error("no connected peers")]
    NoPeers,

    /// The underlying radio refused the frame.
    #[error("transport send failed: {0}")]
    SendFailed(String),
}

/// Contract the host's radio layer implements for the engine.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Ships one encoded envelope to the target. Best-effort; errors are
    /// advisory and never retried by the engine.
    async fn send(&self, target: Target, frame: Bytes) -> Result<(), TransportError>;

    /// The set of peers currently reachable. Membership changes underneath
    /// the engine at any time; this is a snapshot, not a promise.
    fn connected_peers(&self) -> BTreeSet<PeerId>;
}

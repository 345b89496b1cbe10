//! # Engine Configuration & Constants
//!
//! Every magic number in the mesh engine lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong.
//!
//! The defaults describe the reference deployment: a handful of phones in a
//! disaster area, connected over flaky short-range radios, with no server in
//! sight. Tighter intervals burn battery; looser intervals delay delivery.
//! Choose wisely.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Flood parameters
// ---------------------------------------------------------------------------

/// Default hop budget for a freshly created message.
///
/// Each retransmission consumes one hop; with the default of 5 a message
/// triggers at most 5 retransmission events network-wide before it dies.
/// Five hops comfortably covers a neighborhood-scale mesh while keeping
/// broadcast storms bounded.
pub const DEFAULT_TTL: u8 = 5;

/// How often the forward queue is drained and re-broadcast to all connected
/// peers while a room is active.
pub const FORWARD_DRAIN_INTERVAL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Anti-entropy parameters
// ---------------------------------------------------------------------------

/// How often the full inventory (set of seen message ids) is broadcast to
/// every connected peer. Inventory exchange repairs the gaps flooding alone
/// cannot reach: late joiners, brief disconnections, partition healing.
pub const INVENTORY_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Retention & persistence
// ---------------------------------------------------------------------------

/// Messages older than this are pruned from the log. The seen-id set is NOT
/// pruned alongside; see [`crate::store::MessageStore::prune`].
pub const MESSAGE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// How often in-memory state is checkpointed to the storage collaborator.
/// A crash loses at most this much history; acceptable under the
/// store-and-forward design, where neighbors re-supply lost messages anyway.
pub const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Urgency scoring
// ---------------------------------------------------------------------------

/// Base urgency score for an SOS. Any SOS lands in the CRITICAL band once
/// its category weight is added.
pub const SOS_BASE_SCORE: u32 = 50;

/// Base urgency score for a danger report, before severity scaling.
pub const DANGER_BASE_SCORE: u32 = 30;

/// Base urgency score for a resource request.
pub const RESOURCE_BASE_SCORE: u32 = 20;

/// Urgency score for an "I'm OK" status ping.
pub const STATUS_OK_SCORE: u32 = 5;

/// Score thresholds mapping a numeric urgency score onto the priority bands,
/// checked highest-first: `>= CRITICAL_THRESHOLD` is CRITICAL, and so on
/// down to INFO below [`LOW_THRESHOLD`].
pub const CRITICAL_THRESHOLD: u32 = 70;
pub const HIGH_THRESHOLD: u32 = 50;
pub const MEDIUM_THRESHOLD: u32 = 30;
pub const LOW_THRESHOLD: u32 = 10;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for one engine instance.
///
/// Sensible defaults are provided via `Default`; override individual fields
/// when you know your deployment characteristics (dense urban mesh? lower
/// the ttl. Sparse rural relay chain? raise it).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hop budget assigned to locally created messages.
    pub default_ttl: u8,

    /// Interval between forward-queue drains.
    pub drain_interval: Duration,

    /// Interval between inventory broadcasts.
    pub inventory_interval: Duration,

    /// Interval between persistence checkpoints.
    pub checkpoint_interval: Duration,

    /// Age past which log entries are pruned.
    pub prune_max_age: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            drain_interval: FORWARD_DRAIN_INTERVAL,
            inventory_interval: INVENTORY_INTERVAL,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            prune_max_age: MESSAGE_MAX_AGE,
        }
    }
}

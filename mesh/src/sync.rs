//! # Anti-Entropy Synchronization
//!
//! Flooding alone cannot reach everyone. A device that joins late, sleeps
//! through a broadcast, or sits on the wrong side of a brief partition ends
//! up with gaps no further flood will fill — the hop budgets are long spent.
//! This module implements the repair protocol: periodic "what I have"
//! inventory exchange between directly connected peers, with targeted
//! point-to-point refill of whatever is missing.
//!
//! ## Protocol Overview
//!
//! ```text
//! Peer A                              Peer B
//! ──────                              ──────
//!   │  Inventory{a1, a2}                │   on connect + every 30s
//!   │────────────────────────────────>  │
//!   │  RequestMissing{a2}               │   a2 ∉ B's seen set
//!   │<────────────────────────────────  │
//!   │  DataMessage(a2)                  │   unicast, straight to B
//!   │────────────────────────────────>  │
//! ```
//!
//! Both directions run independently; one full round trip each way makes
//! both peers supersets of the pre-sync union. The exchange is a grow-only
//! set merge: idempotent, commutative, convergent under any interleaving or
//! repetition. Receiving the same inventory twice costs one set difference
//! and produces nothing the second time.
//!
//! ## Design Decisions
//!
//! - **Repair is unicast, flood is broadcast.** A missing-message response
//!   goes only to the peer that asked. The flood path is deliberately
//!   redundant (everyone re-broadcasts to everyone); the repair path is
//!   deliberately surgical, because it fills one known gap on one known
//!   peer. Unifying them would either spam the mesh with repairs or
//!   weaken the flood.
//! - **Repair ignores hop accounting.** A repaired message re-enters the
//!   forward path with whatever ttl it carried when stored. Sync exists to
//!   deliver eventually, even to corners of the mesh the original flood
//!   never reached; clamping repaired copies to a spent budget would defeat
//!   that.
//! - **Stateless handlers.** Like the rest of the engine core, nothing here
//!   performs I/O. Handlers read the store and return [`Outbound`] frames
//!   for the runtime to ship after the engine lock is released.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::message::MessageId;
use crate::store::MessageStore;
use crate::transport::{PeerId, Target};
use crate::wire::Envelope;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// An envelope the engine wants sent, paired with its destination.
///
/// Produced under the engine lock, encoded and transmitted after it is
/// released — the lock never spans network I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub envelope: Envelope,
}

impl Outbound {
    pub fn to_peer(peer: &PeerId, envelope: Envelope) -> Self {
        Self {
            target: Target::Peer(peer.clone()),
            envelope,
        }
    }

    pub fn to_all(envelope: Envelope) -> Self {
        Self {
            target: Target::All,
            envelope,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Inventory greeting for a peer that just connected: everything we have,
/// unicast to them alone. Their reply tells us what they lack.
pub fn greeting(store: &MessageStore, peer: &PeerId) -> Outbound {
    Outbound::to_peer(
        peer,
        Envelope::Inventory {
            message_ids: store.inventory(),
        },
    )
}

/// The periodic inventory round: the full seen-id set, broadcast to every
/// connected peer.
pub fn periodic_inventory(store: &MessageStore) -> Outbound {
    Outbound::to_all(Envelope::Inventory {
        message_ids: store.inventory(),
    })
}

/// Computes `remote − local`: the ids a peer advertised that we have never
/// observed.
pub fn missing_from(store: &MessageStore, remote: &BTreeSet<MessageId>) -> BTreeSet<MessageId> {
    remote
        .iter()
        .filter(|id| !store.has_seen(id))
        .cloned()
        .collect()
}

/// Handles a peer's inventory: if it advertises ids we lack, ask that peer
/// for exactly those. An inventory that teaches us nothing produces no
/// traffic, which is what makes repeated rounds free.
pub fn handle_inventory(
    store: &MessageStore,
    from: &PeerId,
    remote: &BTreeSet<MessageId>,
) -> Option<Outbound> {
    let missing = missing_from(store, remote);
    if missing.is_empty() {
        trace!(peer = %from, advertised = remote.len(), "inventory carries nothing new");
        return None;
    }
    debug!(peer = %from, missing = missing.len(), "requesting missing messages");
    Some(Outbound::to_peer(
        from,
        Envelope::RequestMissing {
            missing_ids: missing,
        },
    ))
}

/// Handles a peer's request for messages it lacks: one unicast
/// `DataMessage` per id still present in the log.
///
/// Ids we have seen but since pruned are silently skipped — the requester
/// keeps its gap, and a fresher peer may fill it on a later round.
pub fn handle_request_missing(
    store: &MessageStore,
    from: &PeerId,
    ids: &BTreeSet<MessageId>,
) -> Vec<Outbound> {
    let responses: Vec<Outbound> = ids
        .iter()
        .filter_map(|id| store.lookup(id))
        .map(|msg| {
            Outbound::to_peer(
                from,
                Envelope::DataMessage {
                    message: Box::new(msg.clone()),
                },
            )
        })
        .collect();

    debug!(
        peer = %from,
        requested = ids.len(),
        served = responses.len(),
        "answering missing-message request"
    );
    responses
}

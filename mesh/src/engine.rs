//! # Mesh Engine
//!
//! One engine instance per active room membership, owned by the host and
//! torn down (or [`Engine::clear`]ed) on leave. The engine owns the room's
//! entire mutable state — seen set, message log, forward queue — behind a
//! single lock, and is the one serialized entry point every peer
//! connection's receive loop funnels into.
//!
//! ## Locking discipline
//!
//! Every mutating operation (ingest, create, queue push, queue drain) runs
//! inside the one critical section; that is the whole dedup correctness
//! argument when several receive loops deliver the same flood copy at once.
//! The lock covers memory only. Methods return [`Outbound`] frames and
//! message batches; the runtime encodes and transmits them after the lock
//! is gone. Network and disk I/O never happen under the lock.
//!
//! ## What the engine is not
//!
//! It does not order messages across peers, deliver exactly once, or
//! authenticate anyone. It delivers at least once, suppresses duplicates,
//! and bounds flood amplification — nothing more is promised.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::classify::PriorityClassifier;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::forward::ForwardScheduler;
use crate::message::{now_millis, Message, MessageContent, MessageId};
use crate::store::{IngestOutcome, MessageStore};
use crate::sync;
use crate::sync::Outbound;
use crate::transport::PeerId;
use crate::wire::{self, Envelope};

// ---------------------------------------------------------------------------
// EngineStatus
// ---------------------------------------------------------------------------

/// Point-in-time counters for host display and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// The room this engine serves.
    pub room_id: String,
    /// Messages currently in the log.
    pub message_count: usize,
    /// Ids ever observed (log entries plus prune tombstones).
    pub seen_count: usize,
    /// Copies waiting for the next forward tick.
    pub queue_depth: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Guarded state: the store and the scheduler move together or not at all.
#[derive(Debug, Default)]
struct EngineState {
    store: MessageStore,
    scheduler: ForwardScheduler,
}

/// The propagation and sync engine for one room.
#[derive(Debug)]
pub struct Engine {
    room_id: String,
    config: EngineConfig,
    state: Mutex<EngineState>,
}

impl Engine {
    /// Creates an empty engine bound to a room.
    pub fn new(room_id: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            room_id: room_id.into(),
            config,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Local origination
    // -----------------------------------------------------------------------

    /// Creates a message in this room, classifies it, stores it, and queues
    /// its first retransmission. Returns the stored message (full ttl, zero
    /// hops) so the host can display it immediately.
    pub fn create_message(
        &self,
        sender_id: &str,
        sender_name: &str,
        content: MessageContent,
        location: Option<(f64, f64)>,
        classifier: &dyn PriorityClassifier,
    ) -> Result<Message, EngineError> {
        if self.room_id.is_empty() {
            return Err(EngineError::EmptyRoomId);
        }
        if sender_id.is_empty() {
            return Err(EngineError::EmptySenderId);
        }

        let priority = classifier.classify(&content);
        let mut msg = Message::new(&self.room_id, sender_id, sender_name, content, priority)
            .with_ttl(self.config.default_ttl);
        if let Some((lat, lon)) = location {
            msg = msg.with_location(lat, lon);
        }

        {
            let mut state = self.state.lock();
            state.store.create_and_ingest(msg.clone());
            state.scheduler.schedule(&msg);
        }
        debug!(id = %msg.id, priority = %msg.priority, "created local message");
        Ok(msg)
    }

    // -----------------------------------------------------------------------
    // Ingest
    // -----------------------------------------------------------------------

    /// Offers a received message to the store and, when it is new and has
    /// budget left, queues its forward copy — one atomic step under the
    /// engine lock.
    ///
    /// Errors only on contract violations (empty id, wrong room), which
    /// indicate a schema mismatch between devices and are fatal to the host.
    /// A `Duplicate` outcome is the normal, silent fate of redundant flood
    /// copies.
    pub fn ingest(&self, msg: Message) -> Result<IngestOutcome, EngineError> {
        if msg.id.is_empty() {
            return Err(EngineError::EmptyMessageId);
        }
        if msg.room_id != self.room_id {
            return Err(EngineError::RoomMismatch {
                engine_room: self.room_id.clone(),
                message_room: msg.room_id,
            });
        }

        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.store.ingest(msg.clone());
            if outcome == IngestOutcome::New {
                state.scheduler.schedule(&msg);
            }
            outcome
        };

        match outcome {
            IngestOutcome::New => {
                debug!(id = %msg.id, ttl = msg.ttl, hops = msg.hop_count, "ingested new message")
            }
            IngestOutcome::Duplicate => trace!(id = %msg.id, "dropped duplicate"),
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Frame handling
    // -----------------------------------------------------------------------

    /// Entry point for every frame a peer connection receives.
    ///
    /// Undecodable frames surface as [`EngineError::Decode`]; callers log
    /// and drop those, no state changed. Everything else dispatches through
    /// [`Engine::handle_envelope`].
    pub fn handle_frame(
        &self,
        from: &PeerId,
        frame: &[u8],
    ) -> Result<Vec<Outbound>, EngineError> {
        let envelope = wire::decode(frame)?;
        trace!(peer = %from, kind = envelope.kind(), bytes = frame.len(), "frame received");
        self.handle_envelope(from, envelope)
    }

    /// Dispatches one decoded envelope, returning whatever frames the
    /// protocol wants sent in response.
    ///
    /// Data repaired via anti-entropy takes the same path as flooded data:
    /// ingested, and re-queued for forwarding with whatever ttl it carried.
    /// Sync deliberately outlives the flood-hop budget — that is what lets
    /// it reach corners of the mesh the original flood never did.
    pub fn handle_envelope(
        &self,
        from: &PeerId,
        envelope: Envelope,
    ) -> Result<Vec<Outbound>, EngineError> {
        match envelope {
            Envelope::DataMessage { message } => {
                self.ingest(*message)?;
                Ok(Vec::new())
            }
            Envelope::Inventory { message_ids } => {
                let state = self.state.lock();
                Ok(sync::handle_inventory(&state.store, from, &message_ids)
                    .into_iter()
                    .collect())
            }
            Envelope::RequestMissing { missing_ids } => {
                let state = self.state.lock();
                Ok(sync::handle_request_missing(&state.store, from, &missing_ids))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Peer lifecycle
    // -----------------------------------------------------------------------

    /// Called when the transport reports a new direct connection: greet the
    /// peer with our full inventory so it can pull whatever it missed.
    pub fn peer_connected(&self, peer: &PeerId) -> Outbound {
        debug!(peer = %peer, "peer connected, sending inventory greeting");
        let state = self.state.lock();
        sync::greeting(&state.store, peer)
    }

    /// Called when the transport reports a peer gone. The engine keeps no
    /// per-peer state; in-flight frames to it are simply lost, and the
    /// redundancy of flooding plus the next inventory round cover the gap.
    pub fn peer_disconnected(&self, peer: &PeerId) {
        debug!(peer = %peer, "peer disconnected");
    }

    // -----------------------------------------------------------------------
    // Periodic ticks
    // -----------------------------------------------------------------------

    /// Empties the forward queue in priority order. The runtime broadcasts
    /// every returned copy to all connected peers, fire-and-forget. Callers
    /// must only drain when at least one peer is reachable; with nobody
    /// connected the queue holds the copies for a later tick.
    pub fn drain_forward(&self) -> Vec<Message> {
        let drained = self.state.lock().scheduler.drain();
        if !drained.is_empty() {
            debug!(count = drained.len(), "drained forward queue");
        }
        drained
    }

    /// The periodic inventory broadcast frame.
    pub fn inventory_broadcast(&self) -> Outbound {
        let state = self.state.lock();
        sync::periodic_inventory(&state.store)
    }

    /// Drops log entries older than the configured maximum age. Seen ids
    /// survive as tombstones. Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        self.state
            .lock()
            .store
            .prune(self.config.prune_max_age, now_millis())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Snapshot for the checkpoint tick: the ordered log plus the seen set,
    /// cloned under the lock so the storage write happens outside it.
    pub fn checkpoint(&self) -> (Vec<Message>, BTreeSet<MessageId>) {
        let state = self.state.lock();
        (state.store.messages_ordered(), state.store.inventory())
    }

    /// Restores a previous checkpoint. Replaces all current state; the
    /// forward queue starts empty — persisted messages already had their
    /// retransmission rounds before the restart.
    pub fn restore(&self, messages: Vec<Message>, seen: BTreeSet<MessageId>) {
        let mut state = self.state.lock();
        let count = messages.len();
        state.store.restore(messages, seen);
        state.scheduler.clear();
        debug!(messages = count, seen = state.store.seen_count(), "state restored");
    }

    /// Full reset on room leave: log, seen set, and queue all dropped.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.store.clear();
        state.scheduler.clear();
        warn!(room = %self.room_id, "engine state cleared");
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// The stored message with this id, if the log still holds it.
    pub fn lookup(&self, id: &str) -> Option<Message> {
        self.state.lock().store.lookup(id).cloned()
    }

    /// The log in display order: priority ascending, newest first within a
    /// priority class.
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().store.messages_ordered()
    }

    /// Snapshot of the seen-id set.
    pub fn inventory(&self) -> BTreeSet<MessageId> {
        self.state.lock().store.inventory()
    }

    /// Current counters.
    pub fn status(&self) -> EngineStatus {
        let state = self.state.lock();
        EngineStatus {
            room_id: self.room_id.clone(),
            message_count: state.store.len(),
            seen_count: state.store.seen_count(),
            queue_depth: state.scheduler.len(),
        }
    }
}

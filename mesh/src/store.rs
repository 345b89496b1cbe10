//! Message store: dedup set + message log.
//!
//! The single source of truth for "what I have". Flood routing delivers the
//! same message many times over different paths; [`MessageStore::ingest`] is
//! the one choke point that separates the first copy (kept, forwarded) from
//! the redundant ones (dropped).
//!
//! ## Indices
//!
//! - `seen` — grow-only set of every message id ever observed, created or
//!   received. This is the dedup set and the inventory exchanged with peers.
//! - `messages` — the log, keyed by id for O(1) lookups when answering
//!   missing-message requests.
//! - `order` — a B-tree over [`LogKey`] giving the display/drain order:
//!   priority ascending (CRITICAL first), then timestamp descending (newer
//!   first), re-established on every insertion.
//!
//! The store itself is not synchronized; [`crate::engine::Engine`] wraps it
//! in the single lock that also covers the forward queue, so concurrent
//! receive loops cannot both observe "not seen" for one id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use tracing::debug;

use crate::message::{Message, MessageId};

// ---------------------------------------------------------------------------
// IngestOutcome
// ---------------------------------------------------------------------------

/// Result of offering a message to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First time this id was observed; stored and eligible for forwarding.
    New,
    /// Already seen. Not an error — the normal fate of most flood copies.
    Duplicate,
}

// ---------------------------------------------------------------------------
// LogKey — B-tree ordering key
// ---------------------------------------------------------------------------

/// Composite key for the ordered log view.
///
/// Sorts by priority rank ascending, then by inverted timestamp so newer
/// messages come first within a priority class. The id is the final
/// tiebreaker to guarantee key uniqueness in the B-tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct LogKey {
    priority: u8,
    /// `u64::MAX - timestamp`, so ascending B-tree order yields newest-first.
    inverted_ts: u64,
    id: MessageId,
}

impl LogKey {
    fn for_message(msg: &Message) -> Self {
        Self {
            priority: msg.priority.rank(),
            inverted_ts: u64::MAX - msg.timestamp,
            id: msg.id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageStore
// ---------------------------------------------------------------------------

/// Dedup set plus ordered message log for one room session.
#[derive(Debug, Default)]
pub struct MessageStore {
    /// Every id ever observed. Grow-only; survives log pruning.
    seen: BTreeSet<MessageId>,

    /// Stored messages, each with its as-received ttl/hop count.
    messages: HashMap<MessageId, Message>,

    /// Ordered view over `messages`.
    order: BTreeMap<LogKey, MessageId>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a received message to the store.
    ///
    /// Checks the dedup set and inserts in one step; under the engine lock
    /// this is the atomic check-and-insert that makes dedup correct across
    /// concurrent peer receive loops. A `Duplicate` outcome changes nothing.
    pub fn ingest(&mut self, msg: Message) -> IngestOutcome {
        if self.seen.contains(&msg.id) {
            return IngestOutcome::Duplicate;
        }
        self.insert(msg);
        IngestOutcome::New
    }

    /// Inserts a locally originated message.
    ///
    /// Local ids are freshly generated UUIDs and therefore unconditionally
    /// new; the message still joins the seen set and the log like any other.
    pub fn create_and_ingest(&mut self, msg: Message) {
        debug_assert!(
            !self.seen.contains(&msg.id),
            "locally created id collided with an observed id"
        );
        self.insert(msg);
    }

    fn insert(&mut self, msg: Message) {
        self.seen.insert(msg.id.clone());
        self.order.insert(LogKey::for_message(&msg), msg.id.clone());
        self.messages.insert(msg.id.clone(), msg);
    }

    /// Returns the stored message with the given id, if the log still holds
    /// it. Used to answer missing-message requests from peers.
    pub fn lookup(&self, id: &str) -> Option<&Message> {
        self.messages.get(id)
    }

    /// True if the id has ever been observed, even if since pruned.
    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Snapshot of the seen-id set, as exchanged with peers during
    /// anti-entropy rounds.
    pub fn inventory(&self) -> BTreeSet<MessageId> {
        self.seen.clone()
    }

    /// Iterates the log in display order: priority ascending, newest first
    /// within a priority.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Message> {
        self.order.values().filter_map(|id| self.messages.get(id))
    }

    /// The log in display order, cloned for handing across the lock.
    pub fn messages_ordered(&self) -> Vec<Message> {
        self.iter_ordered().cloned().collect()
    }

    /// Removes log entries older than `max_age`, measured against `now_ms`.
    ///
    /// The seen set is deliberately untouched: a pruned id stays "seen", so
    /// a copy of it arriving later (flood stragglers, anti-entropy repair
    /// from a peer that pruned on a different clock) is still rejected as a
    /// duplicate instead of resurrecting day-old traffic. Returns the number
    /// of entries removed.
    pub fn prune(&mut self, max_age: Duration, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(max_age.as_millis() as u64);

        let stale: Vec<MessageId> = self
            .messages
            .values()
            .filter(|m| m.timestamp < cutoff)
            .map(|m| m.id.clone())
            .collect();

        for id in &stale {
            if let Some(msg) = self.messages.remove(id) {
                self.order.remove(&LogKey::for_message(&msg));
            }
        }

        if !stale.is_empty() {
            debug!(removed = stale.len(), "pruned aged-out log entries");
        }
        stale.len()
    }

    /// Number of messages currently in the log.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of ids ever observed.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Full reset, used when leaving a room. Drops the log AND the seen set.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.messages.clear();
        self.order.clear();
    }

    /// Rebuilds state from a checkpoint: the saved log plus the saved seen
    /// set. Ids referenced by messages are folded into the seen set even if
    /// the saved set misses them.
    pub fn restore(&mut self, messages: Vec<Message>, seen: BTreeSet<MessageId>) {
        self.clear();
        self.seen = seen;
        for msg in messages {
            self.insert(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageContent, Priority};

    fn msg(id: &str, priority: Priority, timestamp: u64) -> Message {
        Message {
            id: id.to_string(),
            room_id: "room".to_string(),
            sender_id: "sender".to_string(),
            sender_name: "Sender".to_string(),
            content: MessageContent::Chat {
                text: "hello".to_string(),
            },
            timestamp,
            ttl: 5,
            hop_count: 0,
            priority,
            lat: None,
            lon: None,
        }
    }

    #[test]
    fn first_ingest_is_new_second_is_duplicate() {
        let mut store = MessageStore::new();
        assert_eq!(store.ingest(msg("m1", Priority::Low, 10)), IngestOutcome::New);
        assert_eq!(
            store.ingest(msg("m1", Priority::Low, 10)),
            IngestOutcome::Duplicate
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.seen_count(), 1);
    }

    #[test]
    fn duplicate_with_different_payload_changes_nothing() {
        let mut store = MessageStore::new();
        store.ingest(msg("m1", Priority::Low, 10));
        // Same id arriving over another path with a different hop count.
        let mut other = msg("m1", Priority::Low, 10);
        other.hop_count = 3;
        assert_eq!(store.ingest(other), IngestOutcome::Duplicate);
        assert_eq!(store.lookup("m1").unwrap().hop_count, 0);
    }

    #[test]
    fn log_orders_by_priority_then_newest() {
        let mut store = MessageStore::new();
        store.ingest(msg("low", Priority::Low, 100));
        store.ingest(msg("critical", Priority::Critical, 50));
        store.ingest(msg("medium", Priority::Medium, 200));
        store.ingest(msg("critical-newer", Priority::Critical, 80));

        let ids: Vec<&str> = store.iter_ordered().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["critical-newer", "critical", "medium", "low"]);
    }

    #[test]
    fn inventory_snapshots_the_seen_set() {
        let mut store = MessageStore::new();
        store.ingest(msg("m1", Priority::Info, 1));
        store.ingest(msg("m2", Priority::Info, 2));
        let inv = store.inventory();
        assert!(inv.contains("m1") && inv.contains("m2"));
        assert_eq!(inv.len(), 2);
    }

    #[test]
    fn prune_removes_old_entries_but_keeps_them_seen() {
        let mut store = MessageStore::new();
        let now: u64 = 1_000_000;
        store.ingest(msg("old", Priority::Info, 1_000));
        store.ingest(msg("fresh", Priority::Info, now - 10));

        let removed = store.prune(Duration::from_millis(100_000), now);
        assert_eq!(removed, 1);
        assert!(store.lookup("old").is_none());
        assert!(store.lookup("fresh").is_some());

        // The pruned id is still a duplicate on re-delivery.
        assert!(store.has_seen("old"));
        assert_eq!(
            store.ingest(msg("old", Priority::Info, 1_000)),
            IngestOutcome::Duplicate
        );
        // And its ordered-view entry is gone.
        assert_eq!(store.iter_ordered().count(), 1);
    }

    #[test]
    fn clear_resets_everything() {
        let mut store = MessageStore::new();
        store.ingest(msg("m1", Priority::Info, 1));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.seen_count(), 0);
        assert_eq!(store.ingest(msg("m1", Priority::Info, 1)), IngestOutcome::New);
    }

    #[test]
    fn restore_rebuilds_log_and_merges_seen_ids() {
        let mut store = MessageStore::new();
        let saved = vec![msg("m1", Priority::High, 5), msg("m2", Priority::Info, 9)];
        let mut seen = BTreeSet::new();
        seen.insert("m1".to_string());
        seen.insert("pruned-long-ago".to_string());

        store.restore(saved, seen);
        assert_eq!(store.len(), 2);
        // m2 came back from the log even though the saved seen set missed it.
        assert!(store.has_seen("m2"));
        // A tombstoned id is still a duplicate after restart.
        assert_eq!(
            store.ingest(msg("pruned-long-ago", Priority::Info, 1)),
            IngestOutcome::Duplicate
        );
    }
}

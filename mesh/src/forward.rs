//! Forward scheduler: TTL-bounded, priority-ordered retransmission queue.
//!
//! Flood routing is what makes the mesh self-healing — every node
//! re-broadcasts each new message to all of its neighbors, so a message
//! survives any single link going dark. The scheduler's job is to keep that
//! flood bounded (hop budget) and ordered (urgent traffic first).
//!
//! ## Hop accounting
//!
//! When a message is ingested as new with budget remaining, a copy with
//! `ttl - 1` / `hop_count + 1` is queued. A copy decremented to exactly zero
//! is still queued — it travels its last leg, and its recipients store it
//! without re-queuing. A message created with ttl=5 therefore triggers at
//! most 5 retransmission events network-wide, and no forwarded copy ever
//! carries `hop_count > 5`.
//!
//! ## No acknowledgements
//!
//! Drained copies are broadcast to all connected peers and forgotten. A send
//! that goes nowhere is not retried here; redundant broadcasts from other
//! relaying peers are the reliability mechanism.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::message::Message;

// ---------------------------------------------------------------------------
// Queued — heap ordering wrapper
// ---------------------------------------------------------------------------

/// A queued forward copy plus the ordering metadata the heap needs.
///
/// Ordered by priority rank, then by insertion sequence so equal-priority
/// copies drain in FIFO order (`BinaryHeap` alone is not stable).
#[derive(Debug, Clone)]
struct Queued {
    priority: u8,
    seq: u64,
    message: Message,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// ForwardScheduler
// ---------------------------------------------------------------------------

/// Priority queue of message copies awaiting re-broadcast.
///
/// Not synchronized on its own; lives under the engine lock next to the
/// store so "ingest as new" and "queue for forwarding" are one atomic step.
#[derive(Debug, Default)]
pub struct ForwardScheduler {
    heap: BinaryHeap<Reverse<Queued>>,
    next_seq: u64,
}

impl ForwardScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the forward copy of a newly ingested message.
    ///
    /// Returns `false` when the message arrived with an exhausted hop budget
    /// and nothing was queued.
    pub fn schedule(&mut self, msg: &Message) -> bool {
        let Some(copy) = msg.forward_copy() else {
            return false;
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Queued {
            priority: copy.priority.rank(),
            seq,
            message: copy,
        }));
        true
    }

    /// Pops the entire queue in priority order (CRITICAL first, FIFO within
    /// a class), leaving it empty. Called on every scheduler tick; the
    /// caller broadcasts each copy after releasing the engine lock.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(Reverse(queued)) = self.heap.pop() {
            out.push(queued.message);
        }
        out
    }

    /// Number of copies waiting for the next tick.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops all pending copies, used on full engine reset.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageContent, Priority};

    fn msg(id: &str, priority: Priority, ttl: u8) -> Message {
        Message {
            id: id.to_string(),
            room_id: "room".to_string(),
            sender_id: "sender".to_string(),
            sender_name: "Sender".to_string(),
            content: MessageContent::Chat {
                text: "hello".to_string(),
            },
            timestamp: 1_000,
            ttl,
            hop_count: 0,
            priority,
            lat: None,
            lon: None,
        }
    }

    #[test]
    fn schedule_decrements_budget_and_counts_the_hop() {
        let mut sched = ForwardScheduler::new();
        assert!(sched.schedule(&msg("m1", Priority::Medium, 5)));

        let drained = sched.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].ttl, 4);
        assert_eq!(drained[0].hop_count, 1);
        assert!(sched.is_empty());
    }

    #[test]
    fn exhausted_arrival_is_never_queued() {
        let mut sched = ForwardScheduler::new();
        assert!(!sched.schedule(&msg("m1", Priority::Critical, 0)));
        assert!(sched.is_empty());
    }

    #[test]
    fn last_hop_copy_is_still_queued() {
        let mut sched = ForwardScheduler::new();
        assert!(sched.schedule(&msg("m1", Priority::Critical, 1)));
        let drained = sched.drain();
        assert_eq!(drained[0].ttl, 0);
    }

    #[test]
    fn drain_yields_lowest_priority_rank_first() {
        let mut sched = ForwardScheduler::new();
        sched.schedule(&msg("low", Priority::Low, 5));
        sched.schedule(&msg("crit", Priority::Critical, 5));
        sched.schedule(&msg("med", Priority::Medium, 5));

        let ids: Vec<String> = sched.drain().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["crit", "med", "low"]);
    }

    #[test]
    fn equal_priority_drains_in_insertion_order() {
        let mut sched = ForwardScheduler::new();
        for i in 0..5 {
            sched.schedule(&msg(&format!("m{i}"), Priority::High, 5));
        }
        let ids: Vec<String> = sched.drain().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn min_element_first_survives_interleaved_pushes_and_drains() {
        let mut sched = ForwardScheduler::new();
        sched.schedule(&msg("info", Priority::Info, 5));
        sched.schedule(&msg("crit1", Priority::Critical, 5));
        let first = sched.drain();
        assert_eq!(first[0].id, "crit1");

        sched.schedule(&msg("high", Priority::High, 5));
        sched.schedule(&msg("crit2", Priority::Critical, 5));
        let second = sched.drain();
        assert_eq!(second[0].id, "crit2");
        assert_eq!(second[1].id, "high");
    }

    #[test]
    fn relay_chain_dies_after_budget_hops() {
        // Simulate the same message relayed node-to-node until the budget
        // runs out: ttl=5 yields exactly 5 retransmission events.
        let original = msg("m1", Priority::Critical, 5);
        let mut current = original;
        let mut events = 0;
        loop {
            let mut sched = ForwardScheduler::new();
            if !sched.schedule(&current) {
                break;
            }
            let mut drained = sched.drain();
            current = drained.pop().unwrap();
            events += 1;
            assert!(current.hop_count <= 5);
        }
        assert_eq!(events, 5);
        assert_eq!(current.hop_count, 5);
    }
}

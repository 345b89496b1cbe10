// Copyright (c) 2026 Beacon Mesh Contributors. MIT License.
// See LICENSE for details.

//! # Beacon Mesh — Propagation & Sync Engine
//!
//! The core of an off-grid emergency messenger: phones in a disaster area
//! form an ad hoc mesh over whatever short-range radio they have, with no
//! server, no infrastructure, and no guarantee that any two devices are ever
//! simultaneously reachable. This crate is the part that makes messages
//! travel anyway.
//!
//! Two mechanisms cooperate:
//!
//! - **Bounded flooding.** Every new message is re-broadcast to all
//!   neighbors with a decrementing hop budget. Redundant copies are the
//!   point — they are what survives links going dark — and the dedup set is
//!   what keeps the redundancy from becoming a storm.
//! - **Anti-entropy repair.** Peers periodically exchange "what I have"
//!   inventories and pull exactly the messages they missed. Late joiners
//!   and partition survivors converge on the union without coordination;
//!   the exchange is a grow-only set merge, idempotent and commutative.
//!
//! What this crate is **not**: a transport (Bluetooth/Wi-Fi Direct/UDP live
//! behind the [`transport::TransportAdapter`] contract), a database (the
//! host implements [`storage::Storage`]), or a UI. It also promises no
//! cross-peer ordering, no exactly-once delivery, and no cryptography —
//! at-least-once, duplicate-suppressed, best-effort delivery with bounded
//! amplification is the whole contract.
//!
//! ## Architecture
//!
//! ```text
//! message.rs    — Message, tagged content variants, priority order
//! classify.rs   — priority assignment contract + reference heuristic
//! store.rs      — dedup set + priority-ordered message log
//! forward.rs    — TTL-bounded retransmission queue
//! sync.rs       — inventory / request-missing / repair protocol
//! wire.rs       — envelope codec over the transport
//! engine.rs     — single-lock state owner, one per room session
//! runtime.rs    — drain / inventory / checkpoint background loops
//! ```

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod forward;
pub mod logging;
pub mod message;
pub mod runtime;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transport;
pub mod wire;

pub use classify::{PriorityClassifier, UrgencyClassifier};
pub use config::EngineConfig;
pub use engine::{Engine, EngineStatus};
pub use error::EngineError;
pub use message::{Message, MessageContent, MessageId, Priority};
pub use runtime::{greet_peer, handle_incoming, restore_from_storage, EngineRuntime};
pub use storage::{MemoryStorage, Storage};
pub use store::IngestOutcome;
pub use sync::Outbound;
pub use transport::{PeerId, Target, TransportAdapter, TransportError};
pub use wire::{decode, encode, DecodeError, EncodeError, Envelope};

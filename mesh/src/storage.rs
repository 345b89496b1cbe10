//! Storage collaborator contract.
//!
//! The engine is in-memory first; persistence exists so a device that
//! restarts mid-disaster comes back with its log and its dedup tombstones
//! instead of re-ingesting (and re-flooding) everything its peers still
//! hold. How bytes reach disk is the host's business — this crate only
//! defines the checkpoint contract and a trivial in-memory implementation.
//!
//! Failures here are logged and swallowed by the runtime; losing a
//! checkpoint costs at most the interval since the previous one, which the
//! store-and-forward design already tolerates.

use std::collections::BTreeSet;

use anyhow::Result;
use parking_lot::Mutex;

use crate::message::{Message, MessageId};

/// Checkpoint contract implemented by the host.
///
/// Called at startup (restore) and on the periodic checkpoint tick. All
/// methods are fallible; errors are reported to the caller, logged, and
/// never crash the engine.
pub trait Storage: Send + Sync {
    /// Loads the persisted message log, empty on first run.
    fn load_messages(&self) -> Result<Vec<Message>>;

    /// Persists the current message log.
    fn save_messages(&self, messages: &[Message]) -> Result<()>;

    /// Loads the persisted seen-id set, empty on first run.
    fn load_seen_ids(&self) -> Result<BTreeSet<MessageId>>;

    /// Persists the current seen-id set.
    fn save_seen_ids(&self, ids: &BTreeSet<MessageId>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// [`Storage`] backed by process memory.
///
/// Useful for tests and for hosts that opt out of persistence entirely;
/// everything is lost on process exit, by construction.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    messages: Mutex<Vec<Message>>,
    seen: Mutex<BTreeSet<MessageId>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn load_messages(&self) -> Result<Vec<Message>> {
        Ok(self.messages.lock().clone())
    }

    fn save_messages(&self, messages: &[Message]) -> Result<()> {
        *self.messages.lock() = messages.to_vec();
        Ok(())
    }

    fn load_seen_ids(&self) -> Result<BTreeSet<MessageId>> {
        Ok(self.seen.lock().clone())
    }

    fn save_seen_ids(&self, ids: &BTreeSet<MessageId>) -> Result<()> {
        *self.seen.lock() = ids.clone();
        Ok(())
    }
}

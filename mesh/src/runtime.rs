//! Background periodic tasks.
//!
//! Three independent repeating loops keep the mesh alive while a room is
//! active:
//!
//! - **forward drain** (2s) — empty the retransmission queue, broadcast
//!   every copy to all connected peers; ticks with no peers leave the
//!   queue untouched so copies go out on a later tick;
//! - **inventory** (30s) — broadcast the seen-id set so peers can pull
//!   their gaps;
//! - **checkpoint** (10s) — prune aged-out log entries, then hand a state
//!   snapshot to the storage collaborator.
//!
//! Each loop acquires the engine lock only for its read/mutate slice and
//! performs all transport and disk I/O afterwards. Send failures are logged
//! at debug and forgotten (flooding is redundant by construction); storage
//! failures are logged at error and the engine keeps running in memory.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::storage::Storage;
use crate::sync::Outbound;
use crate::transport::{PeerId, Target, TransportAdapter};
use crate::wire::{self, Envelope};

/// Ships one outbound frame, fire-and-forget.
async fn send_outbound(transport: &dyn TransportAdapter, outbound: Outbound) {
    let kind = outbound.envelope.kind();
    let frame = match wire::encode(&outbound.envelope) {
        Ok(frame) => frame,
        Err(err) => {
            error!(kind, %err, "failed to encode outbound envelope");
            return;
        }
    };
    if let Err(err) = transport.send(outbound.target, frame).await {
        debug!(kind, %err, "send dropped");
    }
}

/// Sends the inventory greeting for a newly connected peer. Hosts call this
/// from the transport's connect notification.
pub async fn greet_peer(engine: &Engine, transport: &dyn TransportAdapter, peer: &PeerId) {
    let outbound = engine.peer_connected(peer);
    send_outbound(transport, outbound).await;
}

/// Processes one received frame and ships whatever replies the protocol
/// produced. Every peer connection's receive loop funnels here.
///
/// Undecodable frames are logged and dropped with no state change; contract
/// violations propagate to the host, since they mean two devices disagree
/// about the schema.
pub async fn handle_incoming(
    engine: &Engine,
    transport: &dyn TransportAdapter,
    from: &PeerId,
    frame: &[u8],
) -> Result<(), EngineError> {
    let outbound = match engine.handle_frame(from, frame) {
        Ok(outbound) => outbound,
        Err(EngineError::Decode(err)) => {
            warn!(peer = %from, %err, "dropping undecodable frame");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    for out in outbound {
        send_outbound(transport, out).await;
    }
    Ok(())
}

/// Restores engine state from storage at startup.
///
/// Load failures leave the engine empty — the mesh itself is the backup;
/// peers re-supply everything on the first anti-entropy round.
pub fn restore_from_storage(engine: &Engine, storage: &dyn Storage) {
    let messages = match storage.load_messages() {
        Ok(messages) => messages,
        Err(err) => {
            warn!(%err, "could not load persisted messages, starting empty");
            return;
        }
    };
    let seen = match storage.load_seen_ids() {
        Ok(seen) => seen,
        Err(err) => {
            warn!(%err, "could not load persisted seen ids, starting empty");
            return;
        }
    };
    info!(messages = messages.len(), seen = seen.len(), "restoring persisted state");
    engine.restore(messages, seen);
}

// ---------------------------------------------------------------------------
// EngineRuntime
// ---------------------------------------------------------------------------

/// Handles for the three periodic loops of one engine instance.
///
/// Dropping the runtime aborts the loops; the engine itself stays valid and
/// can be re-spawned or cleared by the host.
#[derive(Debug)]
pub struct EngineRuntime {
    tasks: Vec<JoinHandle<()>>,
}

impl EngineRuntime {
    /// Spawns the drain, inventory, and checkpoint loops for an engine.
    ///
    /// Intervals come from the engine's [`crate::config::EngineConfig`].
    /// Call once per room join, from within a tokio runtime.
    pub fn spawn(
        engine: Arc<Engine>,
        transport: Arc<dyn TransportAdapter>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let config = engine.config().clone();

        let drain = {
            let engine = Arc::clone(&engine);
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(config.drain_interval);
                loop {
                    tick.tick().await;
                    // Alone in the room the copies would vanish unheard; leave
                    // them queued until someone is reachable.
                    if transport.connected_peers().is_empty() {
                        continue;
                    }
                    for copy in engine.drain_forward() {
                        send_outbound(
                            transport.as_ref(),
                            Outbound {
                                target: Target::All,
                                envelope: Envelope::DataMessage {
                                    message: Box::new(copy),
                                },
                            },
                        )
                        .await;
                    }
                }
            })
        };

        let inventory = {
            let engine = Arc::clone(&engine);
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(config.inventory_interval);
                loop {
                    tick.tick().await;
                    if transport.connected_peers().is_empty() {
                        continue;
                    }
                    send_outbound(transport.as_ref(), engine.inventory_broadcast()).await;
                }
            })
        };

        let checkpoint = tokio::spawn(async move {
            let mut tick = tokio::time::interval(config.checkpoint_interval);
            loop {
                tick.tick().await;
                engine.prune();
                let (messages, seen) = engine.checkpoint();
                if let Err(err) = storage.save_messages(&messages) {
                    error!(%err, "checkpoint failed to persist messages, continuing in memory");
                    continue;
                }
                if let Err(err) = storage.save_seen_ids(&seen) {
                    error!(%err, "checkpoint failed to persist seen ids, continuing in memory");
                }
            }
        });

        Self {
            tasks: vec![drain, inventory, checkpoint],
        }
    }

    /// Stops all periodic loops.
    pub fn shutdown(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex as StdMutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::config::EngineConfig;
    use crate::message::{Message, MessageContent, MessageId, Priority};
    use crate::storage::MemoryStorage;
    use crate::transport::{PeerId, TransportError};

    /// Transport double that records every frame it is asked to send.
    /// Tests flip `peers` mid-run to simulate connections coming and going.
    #[derive(Debug, Default)]
    struct RecordingTransport {
        peers: StdMutex<BTreeSet<PeerId>>,
        sent: StdMutex<Vec<(Target, Envelope)>>,
    }

    impl RecordingTransport {
        fn with_peer(peer: &str) -> Self {
            Self {
                peers: StdMutex::new(BTreeSet::from([peer.to_string()])),
                sent: StdMutex::new(Vec::new()),
            }
        }

        fn connect(&self, peer: &str) {
            self.peers.lock().unwrap().insert(peer.to_string());
        }
    }

    #[async_trait]
    impl TransportAdapter for RecordingTransport {
        async fn send(&self, target: Target, frame: Bytes) -> Result<(), TransportError> {
            let envelope = wire::decode(&frame).expect("runtime sends well-formed frames");
            self.sent.lock().unwrap().push((target, envelope));
            Ok(())
        }

        fn connected_peers(&self) -> BTreeSet<PeerId> {
            self.peers.lock().unwrap().clone()
        }
    }

    /// Storage double whose saves always fail.
    struct FailingStorage;

    impl Storage for FailingStorage {
        fn load_messages(&self) -> anyhow::Result<Vec<Message>> {
            Err(anyhow!("disk on fire"))
        }
        fn save_messages(&self, _: &[Message]) -> anyhow::Result<()> {
            Err(anyhow!("disk on fire"))
        }
        fn load_seen_ids(&self) -> anyhow::Result<BTreeSet<MessageId>> {
            Err(anyhow!("disk on fire"))
        }
        fn save_seen_ids(&self, _: &BTreeSet<MessageId>) -> anyhow::Result<()> {
            Err(anyhow!("disk on fire"))
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            drain_interval: std::time::Duration::from_millis(10),
            inventory_interval: std::time::Duration::from_millis(10),
            checkpoint_interval: std::time::Duration::from_millis(10),
            ..EngineConfig::default()
        }
    }

    fn remote_msg(id: &str) -> Message {
        Message {
            id: id.to_string(),
            room_id: "room-1".to_string(),
            sender_id: "remote".to_string(),
            sender_name: "Remote".to_string(),
            content: MessageContent::Chat {
                text: "hello".to_string(),
            },
            timestamp: crate::message::now_millis(),
            ttl: 3,
            hop_count: 2,
            priority: Priority::Medium,
            lat: None,
            lon: None,
        }
    }

    #[tokio::test]
    async fn drain_loop_broadcasts_queued_copies() {
        let engine = Arc::new(Engine::new("room-1", fast_config()));
        let transport = Arc::new(RecordingTransport::with_peer("peer-b"));
        let storage = Arc::new(MemoryStorage::new());

        engine.ingest(remote_msg("m1")).unwrap();
        let runtime = EngineRuntime::spawn(
            Arc::clone(&engine),
            Arc::clone(&transport) as Arc<dyn TransportAdapter>,
            storage,
        );

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        runtime.shutdown();

        let sent = transport.sent.lock().unwrap();
        let data_frames: Vec<_> = sent
            .iter()
            .filter(|(target, env)| {
                *target == Target::All && matches!(env, Envelope::DataMessage { .. })
            })
            .collect();
        assert_eq!(data_frames.len(), 1, "one queued copy, one broadcast");
        if let (_, Envelope::DataMessage { message }) = data_frames[0] {
            assert_eq!(message.ttl, 2);
            assert_eq!(message.hop_count, 3);
        }

        // Inventory rounds also went out.
        assert!(sent
            .iter()
            .any(|(_, env)| matches!(env, Envelope::Inventory { .. })));
    }

    #[tokio::test]
    async fn queued_copies_wait_out_peerless_ticks() {
        let engine = Arc::new(Engine::new("room-1", fast_config()));
        let transport = Arc::new(RecordingTransport::default());
        let storage = Arc::new(MemoryStorage::new());

        engine.ingest(remote_msg("m1")).unwrap();
        let runtime = EngineRuntime::spawn(
            Arc::clone(&engine),
            Arc::clone(&transport) as Arc<dyn TransportAdapter>,
            storage,
        );

        // Several ticks pass with nobody in range: nothing is sent and the
        // copy is still queued.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(engine.status().queue_depth, 1);

        // A peer appears and the held copy goes out on the next tick.
        transport.connect("peer-b");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        runtime.shutdown();

        assert_eq!(engine.status().queue_depth, 0);
        let sent = transport.sent.lock().unwrap();
        assert!(sent
            .iter()
            .any(|(target, env)| *target == Target::All
                && matches!(env, Envelope::DataMessage { .. })));
    }

    #[tokio::test]
    async fn checkpoint_loop_persists_state() {
        let engine = Arc::new(Engine::new("room-1", fast_config()));
        let transport = Arc::new(RecordingTransport::default());
        let storage = Arc::new(MemoryStorage::new());

        engine.ingest(remote_msg("m1")).unwrap();
        let runtime = EngineRuntime::spawn(
            Arc::clone(&engine),
            transport,
            Arc::clone(&storage) as Arc<dyn Storage>,
        );
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        runtime.shutdown();

        assert_eq!(storage.load_messages().unwrap().len(), 1);
        assert!(storage.load_seen_ids().unwrap().contains("m1"));
    }

    #[tokio::test]
    async fn persistence_failure_is_non_fatal() {
        let engine = Arc::new(Engine::new("room-1", fast_config()));
        let transport = Arc::new(RecordingTransport::default());

        engine.ingest(remote_msg("m1")).unwrap();
        let runtime = EngineRuntime::spawn(
            Arc::clone(&engine),
            transport,
            Arc::new(FailingStorage) as Arc<dyn Storage>,
        );
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        runtime.shutdown();

        // The engine is still alive and serving in memory.
        assert!(engine.lookup("m1").is_some());
        assert_eq!(
            engine.ingest(remote_msg("m2")).unwrap(),
            crate::store::IngestOutcome::New
        );
    }

    #[tokio::test]
    async fn greeting_is_sent_on_connect() {
        let engine = Engine::new("room-1", EngineConfig::default());
        engine.ingest(remote_msg("m1")).unwrap();
        let transport = RecordingTransport::default();

        greet_peer(&engine, &transport, &"peer-b".to_string()).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Target::Peer("peer-b".to_string()));
        assert!(matches!(sent[0].1, Envelope::Inventory { .. }));
    }

    #[tokio::test]
    async fn incoming_inventory_produces_a_shipped_request() {
        let engine = Engine::new("room-1", EngineConfig::default());
        let transport = RecordingTransport::default();

        let frame = wire::encode(&Envelope::Inventory {
            message_ids: BTreeSet::from(["m9".to_string()]),
        })
        .unwrap();
        handle_incoming(&engine, &transport, &"peer-b".to_string(), &frame)
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Target::Peer("peer-b".to_string()));
        assert!(matches!(sent[0].1, Envelope::RequestMissing { .. }));
    }

    #[tokio::test]
    async fn undecodable_frame_is_dropped_not_fatal() {
        let engine = Engine::new("room-1", EngineConfig::default());
        let transport = RecordingTransport::default();

        handle_incoming(&engine, &transport, &"peer-b".to_string(), b"garbage")
            .await
            .unwrap();

        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(engine.status().message_count, 0);
    }

    #[tokio::test]
    async fn wrong_room_frame_is_fatal() {
        let engine = Engine::new("room-1", EngineConfig::default());
        let transport = RecordingTransport::default();

        let mut msg = remote_msg("m1");
        msg.room_id = "another-room".to_string();
        let frame = wire::encode(&Envelope::DataMessage {
            message: Box::new(msg),
        })
        .unwrap();

        let err = handle_incoming(&engine, &transport, &"peer-b".to_string(), &frame)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RoomMismatch { .. }));
    }

    #[test]
    fn failed_restore_leaves_the_engine_empty() {
        let engine = Engine::new("room-1", EngineConfig::default());
        restore_from_storage(&engine, &FailingStorage);
        assert_eq!(engine.status().message_count, 0);
    }

    #[test]
    fn restore_round_trips_through_memory_storage() {
        let storage = MemoryStorage::new();
        let saved = remote_msg("m1");
        storage.save_messages(std::slice::from_ref(&saved)).unwrap();
        storage
            .save_seen_ids(&BTreeSet::from(["m1".to_string(), "tombstone".to_string()]))
            .unwrap();

        let engine = Engine::new("room-1", EngineConfig::default());
        restore_from_storage(&engine, &storage);
        assert_eq!(engine.status().message_count, 1);
        assert!(engine.inventory().contains("tombstone"));
    }
}

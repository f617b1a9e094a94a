use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use coralpds_core::{EventStore, PdsError, PdsResult, PersistedEvent};
use tokio::sync::mpsc;

use crate::events::CommitEvent;
use crate::sequencer::Sequencer;

/// A wire frame paired with its sequence number, shared between
/// subscribers without copying.
#[derive(Debug)]
pub struct EventFrame {
    pub seq: i64,
    pub did: String,
    /// The DAG-CBOR encoded event.
    pub bytes: Vec<u8>,
}

/// A live subscription to the firehose.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::UnboundedReceiver<Arc<EventFrame>>,
}

/// The firehose: one sequence counter plus the set of live subscribers.
///
/// This is deliberately a value owned by the server process and threaded
/// into handlers, not a process-wide singleton. Delivery is best-effort
/// per subscriber: a failed send evicts that subscriber and never affects
/// the write that produced the event.
pub struct FirehoseHub {
    sequencer: Sequencer,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<Arc<EventFrame>>>>,
    next_subscriber_id: AtomicU64,
    events: Option<Arc<dyn EventStore>>,
}

impl FirehoseHub {
    pub fn new() -> Self {
        Self::with_event_store(None, 0)
    }

    /// `last_seq` seeds the sequencer, typically the event store's max.
    pub fn with_event_store(events: Option<Arc<dyn EventStore>>, last_seq: i64) -> Self {
        FirehoseHub {
            sequencer: Sequencer::new(last_seq),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber map poisoned").len()
    }

    /// Attach a new live subscriber.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("subscriber map poisoned")
            .insert(id, tx);
        Subscription { id, rx }
    }

    /// Attach a subscriber resuming from `cursor`, returning the persisted
    /// frames it missed followed by the live subscription. Frames arriving
    /// live with `seq` at or below the last backfilled one are duplicates
    /// the consumer should skip.
    pub async fn subscribe_from(
        &self,
        cursor: i64,
    ) -> PdsResult<(Vec<PersistedEvent>, Subscription)> {
        let current = self.sequencer.current_seq();
        if cursor > current {
            return Err(PdsError::InvalidRequest(format!(
                "cursor {cursor} is ahead of current seq {current}"
            )));
        }
        // Subscribe before reading the backlog so no event falls between.
        let subscription = self.subscribe();

        let mut backlog = Vec::new();
        if let Some(events) = &self.events {
            let mut after = cursor;
            loop {
                let page = events.get_events_after(after, 256).await?;
                let Some(last) = page.last() else { break };
                after = last.seq;
                backlog.extend(page);
            }
        }
        Ok((backlog, subscription))
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .expect("subscriber map poisoned")
            .remove(&id);
    }

    /// Persist and fan out one event. Send failures are swallowed; the
    /// offending subscribers are evicted before any further delivery.
    pub async fn emit(&self, event: CommitEvent) {
        let bytes = match event.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("failed to encode firehose event {}: {e}", event.seq);
                return;
            }
        };

        if let Some(events) = &self.events {
            let row = PersistedEvent {
                seq: event.seq,
                did: event.did.clone(),
                payload: bytes.clone(),
            };
            if let Err(e) = events.append_event(&row).await {
                tracing::warn!("failed to persist firehose event {}: {e}", event.seq);
            }
        }

        let frame = Arc::new(EventFrame {
            seq: event.seq,
            did: event.did,
            bytes,
        });

        let mut dropped = Vec::new();
        {
            let subscribers = self.subscribers.lock().expect("subscriber map poisoned");
            for (id, tx) in subscribers.iter() {
                if tx.send(frame.clone()).is_err() {
                    dropped.push(*id);
                }
            }
        }
        for id in dropped {
            tracing::warn!("evicting firehose subscriber {id} after send failure");
            self.unsubscribe(id);
        }
    }
}

impl Default for FirehoseHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coralpds_ipld::Cid;
    use coralpds_storage_mem::MemoryEventStore;

    fn event(seq: i64) -> CommitEvent {
        CommitEvent {
            seq,
            did: "did:plc:test".to_string(),
            rev: "3kabcdefghijk".to_string(),
            commit: Cid::from_digest([1; 32]),
            blocks: vec![1, 2, 3],
            time: "2026-08-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_frames() {
        let hub = FirehoseHub::new();
        let mut sub = hub.subscribe();

        let seq = hub.sequencer().next_seq();
        hub.emit(event(seq)).await;

        let frame = sub.rx.recv().await.expect("frame delivered");
        assert_eq!(frame.seq, 1);
        assert!(!frame.bytes.is_empty());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_evicted() {
        let hub = FirehoseHub::new();
        let sub = hub.subscribe();
        let mut live = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(sub.rx);
        hub.emit(event(hub.sequencer().next_seq())).await;

        assert_eq!(hub.subscriber_count(), 1);
        assert!(live.rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_slot() {
        let hub = FirehoseHub::new();
        let sub = hub.subscribe();
        hub.unsubscribe(sub.id);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cursor_resumption_replays_the_backlog() {
        let store = Arc::new(MemoryEventStore::new());
        let hub = FirehoseHub::with_event_store(Some(store), 0);
        for _ in 0..5 {
            let seq = hub.sequencer().next_seq();
            hub.emit(event(seq)).await;
        }

        let (backlog, _sub) = hub.subscribe_from(2).await.unwrap();
        assert_eq!(backlog.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn future_cursor_is_rejected() {
        let hub = FirehoseHub::new();
        assert!(hub.subscribe_from(10).await.is_err());
    }
}

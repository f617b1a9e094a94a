//! In-memory storage backends.
//!
//! The repository engine is written against the storage traits in
//! `coralpds-core` and assumes nothing about the backend; these are the
//! reference implementations used by tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use coralpds_core::traits::{BlockStore, EventStore, KeyStore, RepoRootStore};
use coralpds_core::{PdsResult, PersistedEvent, RepoState, StoredKey};
use coralpds_ipld::Cid;
use sha2::{Digest, Sha256};

/// Content-addressed block storage in a process-local map.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Cid, Bytes>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().expect("block map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put(&self, bytes: &[u8]) -> PdsResult<Cid> {
        let cid = Cid::from_digest(Sha256::digest(bytes).into());
        // Duplicate puts of identical bytes land on the same key; the
        // second insert is a no-op by content addressing.
        self.blocks
            .write()
            .expect("block map poisoned")
            .entry(cid)
            .or_insert_with(|| Bytes::copy_from_slice(bytes));
        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> PdsResult<Option<Bytes>> {
        Ok(self.blocks.read().expect("block map poisoned").get(cid).cloned())
    }

    async fn has(&self, cid: &Cid) -> PdsResult<bool> {
        Ok(self.blocks.read().expect("block map poisoned").contains_key(cid))
    }

    async fn list_all(&self) -> PdsResult<Vec<(Cid, Bytes)>> {
        Ok(self
            .blocks
            .read()
            .expect("block map poisoned")
            .iter()
            .map(|(cid, bytes)| (*cid, bytes.clone()))
            .collect())
    }
}

/// `did → RepoState` map.
#[derive(Default)]
pub struct MemoryRepoRootStore {
    roots: RwLock<HashMap<String, RepoState>>,
}

impl MemoryRepoRootStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepoRootStore for MemoryRepoRootStore {
    async fn get(&self, did: &str) -> PdsResult<Option<RepoState>> {
        Ok(self.roots.read().expect("root map poisoned").get(did).cloned())
    }

    async fn put(&self, state: &RepoState) -> PdsResult<()> {
        self.roots
            .write()
            .expect("root map poisoned")
            .insert(state.did.clone(), state.clone());
        Ok(())
    }

    async fn list_dids(&self) -> PdsResult<Vec<String>> {
        Ok(self.roots.read().expect("root map poisoned").keys().cloned().collect())
    }
}

/// `did → StoredKey` map.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, StoredKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_signing_key(&self, did: &str) -> PdsResult<Option<StoredKey>> {
        Ok(self.keys.read().expect("key map poisoned").get(did).cloned())
    }

    async fn put_signing_key(&self, did: &str, key: &StoredKey) -> PdsResult<()> {
        self.keys
            .write()
            .expect("key map poisoned")
            .insert(did.to_string(), key.clone());
        Ok(())
    }
}

/// Firehose event log ordered by sequence number.
#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<BTreeMap<i64, PersistedEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append_event(&self, event: &PersistedEvent) -> PdsResult<()> {
        self.events
            .write()
            .expect("event map poisoned")
            .insert(event.seq, event.clone());
        Ok(())
    }

    async fn get_events_after(
        &self,
        after_seq: i64,
        limit: usize,
    ) -> PdsResult<Vec<PersistedEvent>> {
        Ok(self
            .events
            .read()
            .expect("event map poisoned")
            .range(after_seq + 1..)
            .take(limit)
            .map(|(_, event)| event.clone())
            .collect())
    }

    async fn get_max_seq(&self) -> PdsResult<i64> {
        Ok(self
            .events
            .read()
            .expect("event map poisoned")
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_content_addressed_and_idempotent() {
        let store = MemoryBlockStore::new();
        let a = store.put(b"hello").await.unwrap();
        let b = store.put(b"hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);

        // CID bytes are the fixed prefix followed by the SHA-256 digest.
        let digest: [u8; 32] = Sha256::digest(b"hello").into();
        assert_eq!(&a.as_bytes()[..4], &[0x01, 0x71, 0x12, 0x20]);
        assert_eq!(a.digest(), digest);
    }

    #[tokio::test]
    async fn get_and_has_report_absence() {
        let store = MemoryBlockStore::new();
        let cid = store.put(b"data").await.unwrap();
        assert!(store.has(&cid).await.unwrap());
        assert_eq!(store.get(&cid).await.unwrap().unwrap(), b"data".as_slice());

        let missing = Cid::from_digest([0; 32]);
        assert!(!store.has(&missing).await.unwrap());
        assert!(store.get(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn event_store_pages_in_order() {
        let store = MemoryEventStore::new();
        for seq in 1..=5 {
            store
                .append_event(&PersistedEvent {
                    seq,
                    did: "did:plc:test".to_string(),
                    payload: vec![seq as u8],
                })
                .await
                .unwrap();
        }
        let page = store.get_events_after(2, 2).await.unwrap();
        assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(store.get_max_seq().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn key_store_roundtrip() {
        let store = MemoryKeyStore::new();
        assert!(store.get_signing_key("did:plc:a").await.unwrap().is_none());
        let key = StoredKey {
            curve: "p256".to_string(),
            secret: vec![1, 2, 3],
        };
        store.put_signing_key("did:plc:a", &key).await.unwrap();
        assert_eq!(store.get_signing_key("did:plc:a").await.unwrap(), Some(key));
    }
}

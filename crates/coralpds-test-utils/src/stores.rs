use std::sync::Arc;

use coralpds_core::RepoConfig;
use coralpds_firehose::FirehoseHub;
use coralpds_repo::RepoEngine;
use coralpds_storage_mem::{
    MemoryBlockStore, MemoryEventStore, MemoryKeyStore, MemoryRepoRootStore,
};

/// A fresh bundle of in-memory stores plus a firehose hub, ready to back a
/// [`RepoEngine`].
pub struct TestStores {
    pub blocks: Arc<MemoryBlockStore>,
    pub roots: Arc<MemoryRepoRootStore>,
    pub keys: Arc<MemoryKeyStore>,
    pub events: Arc<MemoryEventStore>,
    pub hub: Arc<FirehoseHub>,
}

pub fn create_test_stores() -> TestStores {
    let events = Arc::new(MemoryEventStore::new());
    TestStores {
        blocks: Arc::new(MemoryBlockStore::new()),
        roots: Arc::new(MemoryRepoRootStore::new()),
        keys: Arc::new(MemoryKeyStore::new()),
        hub: Arc::new(FirehoseHub::with_event_store(Some(events.clone()), 0)),
        events,
    }
}

impl TestStores {
    /// An engine over these stores with the firehose attached.
    pub fn engine(&self) -> RepoEngine<MemoryBlockStore> {
        RepoEngine::new(
            self.blocks.clone(),
            self.roots.clone(),
            self.keys.clone(),
            Some(self.hub.clone()),
            &RepoConfig::default(),
        )
    }

    /// An engine with no firehose, for tests that only care about repo
    /// state.
    pub fn quiet_engine(&self) -> RepoEngine<MemoryBlockStore> {
        RepoEngine::new(
            self.blocks.clone(),
            self.roots.clone(),
            self.keys.clone(),
            None,
            &RepoConfig::default(),
        )
    }
}

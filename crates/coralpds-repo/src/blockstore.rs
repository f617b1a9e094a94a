//! Block-store adapters used by the write pipeline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use coralpds_core::{BlockStore, PdsResult};
use coralpds_ipld::Cid;

/// Wraps a block store and records every block written through it, in
/// write order. One tracker lives for the duration of a single commit; its
/// recording becomes the commit's firehose CAR, which therefore carries
/// exactly the blocks this commit introduced.
pub struct TrackingStore<S> {
    inner: Arc<S>,
    written: Mutex<Written>,
}

#[derive(Default)]
struct Written {
    order: Vec<(Cid, Bytes)>,
    seen: HashSet<Cid>,
}

impl<S> TrackingStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        TrackingStore {
            inner,
            written: Mutex::new(Written::default()),
        }
    }

    /// Drain the recorded blocks in write order.
    pub fn take_written(&self) -> Vec<(Cid, Bytes)> {
        let mut written = self.written.lock().expect("write log poisoned");
        written.seen.clear();
        std::mem::take(&mut written.order)
    }
}

#[async_trait]
impl<S: BlockStore> BlockStore for TrackingStore<S> {
    async fn put(&self, bytes: &[u8]) -> PdsResult<Cid> {
        let cid = self.inner.put(bytes).await?;
        let mut written = self.written.lock().expect("write log poisoned");
        if written.seen.insert(cid) {
            written.order.push((cid, Bytes::copy_from_slice(bytes)));
        }
        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> PdsResult<Option<Bytes>> {
        self.inner.get(cid).await
    }

    async fn has(&self, cid: &Cid) -> PdsResult<bool> {
        self.inner.has(cid).await
    }

    async fn list_all(&self) -> PdsResult<Vec<(Cid, Bytes)>> {
        self.inner.list_all().await
    }
}

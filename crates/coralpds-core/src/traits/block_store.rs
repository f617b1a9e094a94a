use async_trait::async_trait;
use bytes::Bytes;
use coralpds_ipld::Cid;

use crate::error::PdsResult;

/// Content-addressed storage for opaque blocks.
///
/// `put` derives the CID from the bytes (SHA-256 under the fixed dag-cbor
/// prefix), so putting identical bytes twice yields the same CID and must
/// not error. Implementations must tolerate concurrent puts of identical
/// bytes. Reads hand out [`Bytes`] so a block can be shared between the
/// tree, exports, and firehose frames without copying.
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    async fn put(&self, bytes: &[u8]) -> PdsResult<Cid>;
    async fn get(&self, cid: &Cid) -> PdsResult<Option<Bytes>>;
    async fn has(&self, cid: &Cid) -> PdsResult<bool>;
    /// Every stored block, in unspecified order. Used for whole-store
    /// exports and test assertions.
    async fn list_all(&self) -> PdsResult<Vec<(Cid, Bytes)>>;
}

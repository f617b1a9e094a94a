//! The repository engine: the write pipeline from record JSON to signed
//! commit, firehose event, and updated repo pointer.

use std::sync::Arc;

use coralpds_core::traits::{KeyStore, RepoRootStore};
use coralpds_core::{BlockStore, CommitInfo, PdsError, PdsResult, RepoConfig, RepoState};
use coralpds_crypto::{SigningKey, TidGenerator};
use coralpds_firehose::{CommitEvent, FirehoseHub};
use coralpds_ipld::{Cid, DagValue, dagcbor, write_car};
use coralpds_mst::Tree;

use crate::blockstore::TrackingStore;
use crate::car::{export_blocks_car, export_diff_car};
use crate::commit::UnsignedCommit;
use crate::locks::DidLocks;
use crate::uri::{
    at_uri, ensure_valid_collection, ensure_valid_did, ensure_valid_rkey, record_path,
};

/// Output returned when a record is created, updated, or put.
#[derive(Debug, Clone)]
pub struct RecordWriteOutput {
    pub uri: String,
    pub cid: Cid,
    pub commit: CommitInfo,
}

/// Output returned when reading a record.
#[derive(Debug, Clone)]
pub struct RecordOutput {
    pub uri: String,
    pub cid: Cid,
    pub value: serde_json::Value,
}

/// Drives all repository mutations and reads over a shared block store.
///
/// Every write runs under the repository's DID lock: load state, apply the
/// MST change through a tracking store, sign a commit over the new root,
/// advance the repo pointer, then announce the commit on the firehose with
/// a CAR of exactly the blocks the commit introduced.
pub struct RepoEngine<S: BlockStore> {
    blocks: Arc<S>,
    roots: Arc<dyn RepoRootStore>,
    keys: Arc<dyn KeyStore>,
    firehose: Option<Arc<FirehoseHub>>,
    tids: TidGenerator,
    locks: DidLocks,
    signing_curve: String,
}

enum WriteOp<'a> {
    /// Insert; fails if the key is already present.
    Create(&'a serde_json::Value),
    /// Insert or replace.
    Put(&'a serde_json::Value),
    Delete,
}

impl<S: BlockStore> RepoEngine<S> {
    pub fn new(
        blocks: Arc<S>,
        roots: Arc<dyn RepoRootStore>,
        keys: Arc<dyn KeyStore>,
        firehose: Option<Arc<FirehoseHub>>,
        config: &RepoConfig,
    ) -> Self {
        RepoEngine {
            blocks,
            roots,
            keys,
            firehose,
            tids: TidGenerator::new(),
            locks: DidLocks::new(),
            signing_curve: config.signing_curve.clone(),
        }
    }

    pub fn blocks(&self) -> &Arc<S> {
        &self.blocks
    }

    /// Register an empty repository for `did` and pin its signing key.
    pub async fn create_repo(&self, did: &str) -> PdsResult<()> {
        ensure_valid_did(did)?;
        let _guard = self.locks.for_did(did).lock_owned().await;
        if self.roots.get(did).await?.is_some() {
            return Err(PdsError::InvalidRequest(format!(
                "repository already exists: {did}"
            )));
        }
        self.signing_key_for(did).await?;
        self.roots.put(&RepoState::new(did)).await
    }

    pub async fn create_record(
        &self,
        did: &str,
        collection: &str,
        record: &serde_json::Value,
        rkey: Option<&str>,
    ) -> PdsResult<RecordWriteOutput> {
        let rkey = match rkey {
            Some(rkey) => {
                ensure_valid_rkey(rkey)?;
                rkey.to_string()
            }
            None => self.tids.next_tid()?,
        };
        self.write_record(did, collection, &rkey, WriteOp::Create(record))
            .await
    }

    pub async fn put_record(
        &self,
        did: &str,
        collection: &str,
        rkey: &str,
        record: &serde_json::Value,
    ) -> PdsResult<RecordWriteOutput> {
        ensure_valid_rkey(rkey)?;
        self.write_record(did, collection, rkey, WriteOp::Put(record))
            .await
    }

    pub async fn delete_record(
        &self,
        did: &str,
        collection: &str,
        rkey: &str,
    ) -> PdsResult<CommitInfo> {
        ensure_valid_rkey(rkey)?;
        let output = self
            .write_record(did, collection, rkey, WriteOp::Delete)
            .await?;
        Ok(output.commit)
    }

    pub async fn get_record(
        &self,
        did: &str,
        collection: &str,
        rkey: &str,
    ) -> PdsResult<Option<RecordOutput>> {
        ensure_valid_did(did)?;
        ensure_valid_collection(collection)?;
        ensure_valid_rkey(rkey)?;
        let state = self.state_for(did).await?;

        let tree = Tree::new(self.blocks.clone());
        let key = record_path(collection, rkey);
        let Some(record_cid) = tree.get(state.root.as_ref(), &key).await? else {
            return Ok(None);
        };
        let bytes = self
            .blocks
            .get(&record_cid)
            .await?
            .ok_or_else(|| PdsError::MissingBlock(record_cid.to_string()))?;
        let value: serde_json::Value = serde_ipld_dagcbor::from_slice(&bytes)
            .map_err(|e| PdsError::Storage(format!("failed to decode record: {e}")))?;

        Ok(Some(RecordOutput {
            uri: at_uri(did, collection, rkey),
            cid: record_cid,
            value,
        }))
    }

    /// List records in a collection, in rkey order, up to `limit`,
    /// optionally resuming after a cursor rkey.
    pub async fn list_records(
        &self,
        did: &str,
        collection: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> PdsResult<Vec<RecordOutput>> {
        ensure_valid_did(did)?;
        ensure_valid_collection(collection)?;
        let state = self.state_for(did).await?;

        let tree = Tree::new(self.blocks.clone());
        let prefix = format!("{collection}/");
        let mut selected = Vec::new();
        for (key, cid) in tree.entries(state.root.as_ref()).await? {
            let Some(rkey) = key.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(cursor) = cursor {
                if rkey <= cursor {
                    continue;
                }
            }
            selected.push((rkey.to_string(), cid));
            if selected.len() >= limit {
                break;
            }
        }

        let mut results = Vec::with_capacity(selected.len());
        for (rkey, record_cid) in selected {
            let bytes = self
                .blocks
                .get(&record_cid)
                .await?
                .ok_or_else(|| PdsError::MissingBlock(record_cid.to_string()))?;
            let value: serde_json::Value = serde_ipld_dagcbor::from_slice(&bytes)
                .map_err(|e| PdsError::Storage(format!("failed to decode record: {e}")))?;
            results.push(RecordOutput {
                uri: at_uri(did, collection, &rkey),
                cid: record_cid,
                value,
            });
        }
        Ok(results)
    }

    /// Full repository export: all blocks reachable from the head commit,
    /// rooted at it.
    pub async fn sync_get_repo(&self, did: &str) -> PdsResult<Vec<u8>> {
        self.sync_get_repo_since(did, None).await
    }

    /// As [`RepoEngine::sync_get_repo`], but with `since` present only the
    /// blocks not already reachable from that older commit are included.
    pub async fn sync_get_repo_since(&self, did: &str, since: Option<&Cid>) -> PdsResult<Vec<u8>> {
        ensure_valid_did(did)?;
        let state = self.state_for(did).await?;
        let head = state
            .head
            .ok_or_else(|| PdsError::NotFound(format!("repository {did} has no commits")))?;
        export_diff_car(&self.blocks, &head, since).await
    }

    /// Export exactly the requested blocks.
    pub async fn sync_get_blocks(&self, cids: &[Cid]) -> PdsResult<Vec<u8>> {
        export_blocks_car(&self.blocks, cids).await
    }

    pub async fn repo_state(&self, did: &str) -> PdsResult<RepoState> {
        self.state_for(did).await
    }

    async fn state_for(&self, did: &str) -> PdsResult<RepoState> {
        self.roots
            .get(did)
            .await?
            .ok_or_else(|| PdsError::NotFound(format!("repository {did}")))
    }

    /// Load the repository's signing key, generating and persisting one on
    /// first use.
    async fn signing_key_for(&self, did: &str) -> PdsResult<SigningKey> {
        match self.keys.get_signing_key(did).await? {
            Some(stored) => SigningKey::from_stored(&stored),
            None => {
                let key = SigningKey::generate(&self.signing_curve)?;
                self.keys.put_signing_key(did, &key.to_stored()).await?;
                Ok(key)
            }
        }
    }

    async fn write_record(
        &self,
        did: &str,
        collection: &str,
        rkey: &str,
        op: WriteOp<'_>,
    ) -> PdsResult<RecordWriteOutput> {
        ensure_valid_did(did)?;
        ensure_valid_collection(collection)?;

        let _guard = self.locks.for_did(did).lock_owned().await;
        let state = self.state_for(did).await?;

        let tracking = Arc::new(TrackingStore::new(self.blocks.clone()));
        let tree = Tree::new(tracking.clone());
        let key = record_path(collection, rkey);

        let (record_cid, new_root) = match op {
            WriteOp::Create(record) => {
                if tree.get(state.root.as_ref(), &key).await?.is_some() {
                    return Err(PdsError::InvalidRequest(format!(
                        "record already exists: {key}"
                    )));
                }
                let record_cid = self.put_record_block(&tracking, record).await?;
                let root = tree.put(state.root.as_ref(), &key, record_cid).await?;
                (record_cid, root)
            }
            WriteOp::Put(record) => {
                let record_cid = self.put_record_block(&tracking, record).await?;
                let root = tree.put(state.root.as_ref(), &key, record_cid).await?;
                (record_cid, root)
            }
            WriteOp::Delete => {
                let record_cid = tree
                    .get(state.root.as_ref(), &key)
                    .await?
                    .ok_or_else(|| PdsError::NotFound(format!("record {key}")))?;
                match tree.delete(state.root.as_ref(), &key).await? {
                    Some(root) => (record_cid, root),
                    // Last record gone: the commit still needs a data
                    // target, so it points at the canonical empty node.
                    None => (record_cid, tree.persist_empty().await?),
                }
            }
        };

        let commit = self.commit_and_announce(&state, new_root, &tracking).await?;
        Ok(RecordWriteOutput {
            uri: at_uri(did, collection, rkey),
            cid: record_cid,
            commit,
        })
    }

    async fn put_record_block(
        &self,
        tracking: &Arc<TrackingStore<S>>,
        record: &serde_json::Value,
    ) -> PdsResult<Cid> {
        let value = DagValue::from_json(record)?;
        let bytes = dagcbor::encode(&value)?;
        tracking.put(&bytes).await
    }

    /// Steps 4–6 of the write pipeline: sign a commit over the new root,
    /// advance the repo pointer, and emit the firehose event.
    async fn commit_and_announce(
        &self,
        state: &RepoState,
        new_root: Cid,
        tracking: &Arc<TrackingStore<S>>,
    ) -> PdsResult<CommitInfo> {
        let rev = self.tids.next_tid()?;
        let signing_key = self.signing_key_for(&state.did).await?;
        let signed = UnsignedCommit::new(state.did.clone(), new_root, rev.clone(), state.head)
            .sign(&signing_key)?;
        let commit_cid = tracking.put(&signed.encode()?).await?;

        self.roots
            .put(&RepoState {
                did: state.did.clone(),
                head: Some(commit_cid),
                root: Some(new_root),
                rev: Some(rev.clone()),
            })
            .await?;
        tracing::debug!(did = %state.did, %rev, commit = %commit_cid, "applied commit");

        if let Some(hub) = &self.firehose {
            // Commit block first, then the MST nodes and records this
            // commit introduced, in write order.
            let written = tracking.take_written();
            let mut sections = Vec::with_capacity(written.len());
            for (cid, bytes) in written {
                if cid == commit_cid {
                    sections.insert(0, (cid, bytes));
                } else {
                    sections.push((cid, bytes));
                }
            }
            let car = write_car(&[commit_cid], &sections)?;
            let event = CommitEvent {
                seq: hub.sequencer().next_seq(),
                did: state.did.clone(),
                rev: rev.clone(),
                commit: commit_cid,
                blocks: car,
                time: CommitEvent::now_timestamp(),
            };
            hub.emit(event).await;
        }

        Ok(CommitInfo {
            cid: commit_cid,
            rev,
        })
    }
}

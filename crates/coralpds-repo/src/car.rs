//! Repository CAR export.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use coralpds_core::{BlockStore, PdsError, PdsResult};
use coralpds_ipld::{Cid, write_car};
use coralpds_mst::Tree;

use crate::commit::SignedCommit;

/// Export every block reachable from the head commit as a CARv1 archive
/// with `roots = [head]`: the commit first, then MST nodes and records in
/// walk order.
pub async fn export_full_car<S: BlockStore>(blocks: &Arc<S>, head: &Cid) -> PdsResult<Vec<u8>> {
    let reachable = reachable_blocks(blocks, head).await?;
    Ok(write_car(&[*head], &reachable)?)
}

/// Export only the blocks reachable from `head` but not from `since`,
/// still rooted at `head`. With no `since` this is a full export.
pub async fn export_diff_car<S: BlockStore>(
    blocks: &Arc<S>,
    head: &Cid,
    since: Option<&Cid>,
) -> PdsResult<Vec<u8>> {
    let Some(since) = since else {
        return export_full_car(blocks, head).await;
    };
    let (previous, current) = futures::try_join!(
        reachable_blocks(blocks, since),
        reachable_blocks(blocks, head)
    )?;
    let previous: HashSet<Cid> = previous.into_iter().map(|(cid, _)| cid).collect();
    let fresh: Vec<(Cid, Bytes)> = current
        .into_iter()
        .filter(|(cid, _)| !previous.contains(cid))
        .collect();
    Ok(write_car(&[*head], &fresh)?)
}

/// Export exactly the requested blocks, no roots. The blocks are fetched
/// concurrently; any absent block is a structural error.
pub async fn export_blocks_car<S: BlockStore>(
    blocks: &Arc<S>,
    cids: &[Cid],
) -> PdsResult<Vec<u8>> {
    let fetches = cids.iter().map(|cid| async move {
        blocks
            .get(cid)
            .await?
            .map(|bytes| (*cid, bytes))
            .ok_or_else(|| PdsError::MissingBlock(cid.to_string()))
    });
    let sections: Vec<(Cid, Bytes)> = futures::future::try_join_all(fetches).await?;
    Ok(write_car(&[], &sections)?)
}

/// The commit block followed by everything its MST root reaches.
async fn reachable_blocks<S: BlockStore>(
    blocks: &Arc<S>,
    head: &Cid,
) -> PdsResult<Vec<(Cid, Bytes)>> {
    let commit_bytes = blocks
        .get(head)
        .await?
        .ok_or_else(|| PdsError::MissingBlock(head.to_string()))?;
    let commit = SignedCommit::decode(&commit_bytes)?;

    let tree = Tree::new(blocks.clone());
    let mut out = vec![(*head, commit_bytes)];
    out.extend(tree.walk_blocks(&commit.commit.data).await?);
    Ok(out)
}

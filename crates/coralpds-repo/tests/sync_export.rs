use coralpds_crypto::sha256;
use coralpds_ipld::{Cid, read_car};
use coralpds_repo::SignedCommit;
use coralpds_test_utils::{create_test_stores, random_record};

const DID: &str = "did:plc:ewvi7nxzyoun6zhxrhs64oiz";
const COLLECTION: &str = "com.example.record";

#[tokio::test]
async fn full_export_is_rooted_at_head_and_complete() {
    let stores = create_test_stores();
    let engine = stores.engine();
    engine.create_repo(DID).await.unwrap();

    let mut record_cids = Vec::new();
    for i in 0..10 {
        let output = engine
            .create_record(DID, COLLECTION, &random_record(), Some(&format!("r{i}")))
            .await
            .unwrap();
        record_cids.push(output.cid);
    }
    let head = engine.repo_state(DID).await.unwrap().head.unwrap();

    let car = engine.sync_get_repo(DID).await.unwrap();
    let archive = read_car(&car).unwrap();
    assert_eq!(archive.roots, vec![head]);

    // The commit rides first, and every block is correctly addressed.
    assert_eq!(archive.blocks[0].0, head);
    for (cid, bytes) in &archive.blocks {
        assert_eq!(*cid, Cid::from_digest(sha256(bytes)), "mis-addressed block");
    }

    let exported: std::collections::HashSet<Cid> =
        archive.blocks.iter().map(|(cid, _)| *cid).collect();
    for record_cid in &record_cids {
        assert!(exported.contains(record_cid), "record missing from export");
    }

    // The exported commit decodes and points at the current root.
    let commit = SignedCommit::decode(&archive.blocks[0].1).unwrap();
    assert_eq!(Some(commit.commit.data), engine.repo_state(DID).await.unwrap().root);
}

#[tokio::test]
async fn diff_export_only_carries_new_blocks() {
    let stores = create_test_stores();
    let engine = stores.engine();
    engine.create_repo(DID).await.unwrap();

    let first = engine
        .create_record(DID, COLLECTION, &random_record(), Some("older"))
        .await
        .unwrap();
    let since = engine.repo_state(DID).await.unwrap().head.unwrap();

    let second = engine
        .create_record(DID, COLLECTION, &random_record(), Some("newer"))
        .await
        .unwrap();

    let car = engine
        .sync_get_repo_since(DID, Some(&since))
        .await
        .unwrap();
    let archive = read_car(&car).unwrap();
    let cids: std::collections::HashSet<Cid> =
        archive.blocks.iter().map(|(cid, _)| *cid).collect();

    assert_eq!(archive.roots, vec![second.commit.cid]);
    assert!(cids.contains(&second.commit.cid));
    assert!(cids.contains(&second.cid), "new record must be present");
    assert!(!cids.contains(&first.cid), "old record must be diffed away");
    assert!(!cids.contains(&since), "old commit must be diffed away");
}

#[tokio::test]
async fn get_blocks_exports_exactly_the_requested_blocks() {
    let stores = create_test_stores();
    let engine = stores.engine();
    engine.create_repo(DID).await.unwrap();

    let a = engine
        .create_record(DID, COLLECTION, &random_record(), Some("a"))
        .await
        .unwrap();
    let b = engine
        .create_record(DID, COLLECTION, &random_record(), Some("b"))
        .await
        .unwrap();

    let car = engine.sync_get_blocks(&[a.cid, b.cid]).await.unwrap();
    let archive = read_car(&car).unwrap();
    assert!(archive.roots.is_empty());
    assert_eq!(
        archive.blocks.iter().map(|(cid, _)| *cid).collect::<Vec<_>>(),
        vec![a.cid, b.cid]
    );

    let missing = Cid::from_digest([0xEE; 32]);
    assert!(engine.sync_get_blocks(&[missing]).await.is_err());
}

#[tokio::test]
async fn exporting_a_repo_with_no_commits_is_not_found() {
    let stores = create_test_stores();
    let engine = stores.engine();
    engine.create_repo(DID).await.unwrap();
    assert!(engine.sync_get_repo(DID).await.is_err());
}

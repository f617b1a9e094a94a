use coralpds_ipld::Cid;

/// Persisted pointer for one repository, keyed by DID.
///
/// `head` is the CID of the signed commit that points at `root`; a
/// repository with no commits yet has all three fields absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoState {
    pub did: String,
    pub head: Option<Cid>,
    pub root: Option<Cid>,
    pub rev: Option<String>,
}

impl RepoState {
    pub fn new(did: impl Into<String>) -> Self {
        RepoState {
            did: did.into(),
            head: None,
            root: None,
            rev: None,
        }
    }
}

/// The commit produced by a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub cid: Cid,
    pub rev: String,
}

/// A repository signing key at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    /// "p256" or "k256".
    pub curve: String,
    /// Raw private scalar bytes.
    pub secret: Vec<u8>,
}

/// A persisted firehose event row.
#[derive(Debug, Clone)]
pub struct PersistedEvent {
    pub seq: i64,
    pub did: String,
    /// The wire-encoded DAG-CBOR event frame.
    pub payload: Vec<u8>,
}

//! Signed repository commits.
//!
//! A commit is a small DAG-CBOR map pointing at an MST root. The signature
//! covers the SHA-256 of the *unsigned* encoding, so any field change
//! invalidates it; the commit's own CID covers the signed encoding.

use coralpds_core::{PdsError, PdsResult};
use coralpds_crypto::{PublicKey, SIGNATURE_LEN, SigningKey, sha256};
use coralpds_ipld::{Cid, DagValue, Reader, dagcbor};

pub const COMMIT_VERSION: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedCommit {
    pub did: String,
    pub version: i64,
    /// CID of the MST root.
    pub data: Cid,
    /// Revision TID; sortable per repository.
    pub rev: String,
    /// Previous commit in this repository's chain; absent on the first
    /// commit (omitted from the encoding, never encoded as null).
    pub prev: Option<Cid>,
}

impl UnsignedCommit {
    pub fn new(did: impl Into<String>, data: Cid, rev: impl Into<String>, prev: Option<Cid>) -> Self {
        UnsignedCommit {
            did: did.into(),
            version: COMMIT_VERSION,
            data,
            rev: rev.into(),
            prev,
        }
    }

    fn fields(&self) -> Vec<(String, DagValue)> {
        let mut fields = vec![
            ("did".to_string(), DagValue::text(&self.did)),
            ("version".to_string(), DagValue::Integer(self.version)),
            ("data".to_string(), DagValue::Link(self.data)),
            ("rev".to_string(), DagValue::text(&self.rev)),
        ];
        if let Some(prev) = self.prev {
            fields.push(("prev".to_string(), DagValue::Link(prev)));
        }
        fields
    }

    pub fn encode(&self) -> PdsResult<Vec<u8>> {
        Ok(dagcbor::encode(&DagValue::Map(self.fields()))?)
    }

    /// The digest that gets signed.
    pub fn signing_digest(&self) -> PdsResult<[u8; 32]> {
        Ok(sha256(&self.encode()?))
    }

    pub fn sign(self, key: &SigningKey) -> PdsResult<SignedCommit> {
        let sig = key.sign(&self.signing_digest()?)?;
        Ok(SignedCommit { commit: self, sig })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCommit {
    pub commit: UnsignedCommit,
    pub sig: [u8; SIGNATURE_LEN],
}

impl SignedCommit {
    pub fn encode(&self) -> PdsResult<Vec<u8>> {
        let mut fields = self.commit.fields();
        fields.push(("sig".to_string(), DagValue::Bytes(self.sig.to_vec())));
        Ok(dagcbor::encode(&DagValue::Map(fields))?)
    }

    /// The commit's content address.
    pub fn cid(&self) -> PdsResult<Cid> {
        Ok(Cid::from_digest(sha256(&self.encode()?)))
    }

    /// Decode a persisted commit block.
    pub fn decode(bytes: &[u8]) -> PdsResult<Self> {
        let mut r = Reader::new(bytes);
        let entries = r.read_map().map_err(|e| bad_commit(&e.to_string()))?;

        let mut did = None;
        let mut version = None;
        let mut data = None;
        let mut rev = None;
        let mut prev = None;
        let mut sig = None;
        for _ in 0..entries {
            match r.read_text()? {
                "did" => did = Some(r.read_text()?.to_string()),
                "version" => version = Some(r.read_int()?),
                "data" => data = Some(r.read_link()?),
                "rev" => rev = Some(r.read_text()?.to_string()),
                // tolerate `prev: null` from foreign encoders
                "prev" => prev = r.read_optional_link()?,
                "sig" => sig = Some(r.read_bytes()?.to_vec()),
                _ => r.skip_value()?,
            }
        }

        let (Some(did), Some(version), Some(data), Some(rev), Some(sig)) =
            (did, version, data, rev, sig)
        else {
            return Err(bad_commit("missing required field"));
        };
        if version != COMMIT_VERSION {
            return Err(bad_commit(&format!("unsupported version {version}")));
        }
        let sig: [u8; SIGNATURE_LEN] = sig
            .try_into()
            .map_err(|_| bad_commit("signature is not 64 bytes"))?;

        Ok(SignedCommit {
            commit: UnsignedCommit {
                did,
                version,
                data,
                rev,
                prev,
            },
            sig,
        })
    }

    /// Check the signature against the unsigned encoding.
    pub fn verify(&self, key: &PublicKey) -> PdsResult<bool> {
        key.verify(&self.commit.signing_digest()?, &self.sig)
    }
}

fn bad_commit(detail: &str) -> PdsError {
    PdsError::InvalidRequest(format!("malformed commit: {detail}"))
}

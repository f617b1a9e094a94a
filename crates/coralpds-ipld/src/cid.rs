//! Content identifiers for DAG-CBOR blocks.
//!
//! Every block in a repository is named by a CIDv1 over the `dag-cbor`
//! codec with a SHA-256 multihash, which pins the binary form to exactly
//! 36 bytes: a fixed 4-byte prefix followed by the 32-byte digest.

use std::fmt;
use std::str::FromStr;

use base32::Alphabet;

use crate::error::{IpldError, IpldResult};

/// Length of a CID in its binary form.
pub const CID_LEN: usize = 36;

/// CIDv1, codec `dag-cbor` (0x71), multihash `sha2-256` (0x12), digest length 32.
pub const CID_PREFIX: [u8; 4] = [0x01, 0x71, 0x12, 0x20];

const BASE32_LOWER: Alphabet = Alphabet::Rfc4648Lower { padding: false };

/// A 36-byte content identifier.
///
/// Equality and ordering are byte equality of the full 36 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid([u8; CID_LEN]);

impl Cid {
    /// Build a CID from a SHA-256 digest by prepending the fixed prefix.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        let mut bytes = [0u8; CID_LEN];
        bytes[..4].copy_from_slice(&CID_PREFIX);
        bytes[4..].copy_from_slice(&digest);
        Cid(bytes)
    }

    /// Reconstruct a CID from its raw binary form.
    pub fn from_bytes(bytes: &[u8]) -> IpldResult<Self> {
        let arr: [u8; CID_LEN] = bytes
            .try_into()
            .map_err(|_| IpldError::InvalidCid(format!("expected 36 bytes, got {}", bytes.len())))?;
        Ok(Cid(arr))
    }

    /// Parse the canonical string form: `'b'` followed by unpadded
    /// lower-case base32. Returns `None` for anything that does not decode
    /// to exactly 36 bytes. Only the canonical alphabet is accepted.
    pub fn try_parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix('b')?;
        if !rest
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
        {
            return None;
        }
        let bytes = base32::decode(BASE32_LOWER, rest)?;
        Cid::from_bytes(&bytes).ok()
    }

    pub fn as_bytes(&self) -> &[u8; CID_LEN] {
        &self.0
    }

    /// The SHA-256 digest portion (bytes 4..36).
    pub fn digest(&self) -> &[u8] {
        &self.0[4..]
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", base32::encode(BASE32_LOWER, &self.0))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

impl FromStr for Cid {
    type Err = IpldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cid::try_parse(s).ok_or_else(|| IpldError::InvalidCid(s.to_string()))
    }
}

//! MST node model and its prefix-compressed block encoding.
//!
//! A node is a 2-element CBOR array `[left, entries]`; each entry is a
//! 4-element array `[prefixLen, keySuffix, value, tree]`. In memory the
//! entries carry their full keys; compression against the preceding key is
//! applied only at the encoding boundary, so tree shape and block bytes are
//! pure functions of the node's content.

use std::cmp::Ordering;
use std::sync::LazyLock;

use coralpds_core::{PdsError, PdsResult};
use coralpds_crypto::sha256;
use coralpds_ipld::{Cid, DagValue, Reader, dagcbor};
use regex::Regex;

/// One leaf entry: a full key, the record CID it points at, and the
/// right-neighbor subtree holding keys strictly between this entry and the
/// next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub key: String,
    pub value: Cid,
    pub tree: Option<Cid>,
}

/// A single MST node. All entries of a node sit on the same layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub left: Option<Cid>,
    pub entries: Vec<TreeEntry>,
}

impl Node {
    pub fn empty() -> Self {
        Node::default()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.entries.is_empty()
    }

    /// The node's layer: the layer of its first entry's key. An empty node
    /// has no layer (conceptually -1).
    pub fn layer(&self) -> Option<u32> {
        self.entries.first().map(|entry| key_layer(&entry.key))
    }

    /// Encode to the canonical block form.
    pub fn encode(&self) -> PdsResult<Vec<u8>> {
        let mut entries = Vec::with_capacity(self.entries.len());
        let mut prev = "";
        for entry in &self.entries {
            if !prev.is_empty() && compare_keys(prev, &entry.key) != Ordering::Less {
                return Err(PdsError::InvalidRequest(format!(
                    "entries out of order at key {}",
                    entry.key
                )));
            }
            let prefix_len = common_prefix_len(prev.as_bytes(), entry.key.as_bytes());
            let suffix = std::str::from_utf8(&entry.key.as_bytes()[prefix_len..])
                .map_err(|_| bad_node("key suffix is not valid UTF-8"))?;
            entries.push(DagValue::List(vec![
                DagValue::Integer(prefix_len as i64),
                DagValue::text(suffix),
                DagValue::Link(entry.value),
                entry.tree.map(DagValue::Link).unwrap_or(DagValue::Null),
            ]));
            prev = &entry.key;
        }
        let value = DagValue::List(vec![
            self.left.map(DagValue::Link).unwrap_or(DagValue::Null),
            DagValue::List(entries),
        ]);
        Ok(dagcbor::encode(&value)?)
    }

    /// Decode a block back into a node, reconstructing full keys from the
    /// prefix-compressed suffixes.
    pub fn decode(bytes: &[u8]) -> PdsResult<Node> {
        let mut r = Reader::new(bytes);
        if r.read_array()? != 2 {
            return Err(bad_node("expected a 2-element node array"));
        }
        let left = r.read_optional_link()?;

        let count = r.read_array()?;
        let mut entries: Vec<TreeEntry> = Vec::with_capacity(count as usize);
        let mut prev: Vec<u8> = Vec::new();
        for _ in 0..count {
            if r.read_array()? != 4 {
                return Err(bad_node("expected a 4-element entry array"));
            }
            let prefix_len = r.read_u64()? as usize;
            let suffix = r.read_text()?;
            let value = r.read_link()?;
            let tree = r.read_optional_link()?;

            if prefix_len > prev.len() {
                return Err(bad_node("prefix length exceeds preceding key"));
            }
            let mut key_bytes = prev[..prefix_len].to_vec();
            key_bytes.extend_from_slice(suffix.as_bytes());
            let key = String::from_utf8(key_bytes)
                .map_err(|_| bad_node("reconstructed key is not valid UTF-8"))?;
            if let Some(last) = entries.last() {
                if compare_keys(&last.key, &key) != Ordering::Less {
                    return Err(bad_node("entries are not strictly sorted"));
                }
            }
            prev = key.as_bytes().to_vec();
            entries.push(TreeEntry { key, value, tree });
        }
        if !r.is_at_end() {
            return Err(bad_node("trailing bytes after node"));
        }
        Ok(Node { left, entries })
    }
}

fn bad_node(detail: &str) -> PdsError {
    PdsError::InvalidRequest(format!("malformed MST node: {detail}"))
}

/// Key comparison shared with DAG-CBOR map keys: UTF-8 byte length
/// ascending, then lexicographic byte order.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    dagcbor::key_order(a, b)
}

/// Number of leading bytes shared by `a` and `b`.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// The layer of a key: half the count of leading zero bits in its SHA-256
/// hash. Higher layers are exponentially rarer, giving a fanout of ~4.
pub fn key_layer(key: &str) -> u32 {
    let hash = sha256(key.as_bytes());
    let mut bits = 0u32;
    for byte in hash {
        if byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits / 2
}

static KEY_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_\-:.~]+$").expect("static regex compiles"));

/// MST keys are `collection/rkey` paths over a restricted ASCII charset,
/// at most 256 bytes.
pub fn ensure_valid_key(key: &str) -> PdsResult<()> {
    let mut split = key.split('/');
    let valid = match (split.next(), split.next(), split.next()) {
        (Some(collection), Some(rkey), None) => {
            key.len() <= 256 && KEY_SEGMENT.is_match(collection) && KEY_SEGMENT.is_match(rkey)
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PdsError::InvalidRequest(format!("invalid MST key: {key}")))
    }
}

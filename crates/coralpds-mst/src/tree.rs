//! Merkle Search Tree operations.
//!
//! The tree is content-addressed and immutable: every mutation builds new
//! nodes, persists them through the block store, and returns a new root
//! CID. Shape is determined only by the key/value set, so any insertion
//! order over the same content converges on the same root CID.
//!
//! Each key lives on the layer given by [`key_layer`]; a node holds the
//! entries of one layer, with subtree pointers down to the next populated
//! layer. Inserting a key above the current root splits the root around
//! it; deleting a key merges the two subtrees it separated.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use coralpds_core::{BlockStore, PdsError, PdsResult};
use coralpds_ipld::Cid;

use crate::node::{Node, TreeEntry, compare_keys, ensure_valid_key, key_layer};

pub struct Tree<S: BlockStore> {
    store: Arc<S>,
}

impl<S: BlockStore> Tree<S> {
    pub fn new(store: Arc<S>) -> Self {
        Tree { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Look up `key`, descending from `root`. Missing child blocks surface
    /// as absence, matching lookup semantics.
    pub async fn get(&self, root: Option<&Cid>, key: &str) -> PdsResult<Option<Cid>> {
        let Some(root) = root else {
            return Ok(None);
        };
        match self.load_opt(root).await? {
            Some(node) => self.get_in(node, key).await,
            None => Ok(None),
        }
    }

    /// Insert or replace `key → value`, returning the new root CID.
    pub async fn put(&self, root: Option<&Cid>, key: &str, value: Cid) -> PdsResult<Cid> {
        ensure_valid_key(key)?;
        let node = match root {
            Some(cid) => self.load(cid).await?,
            None => Node::empty(),
        };
        let new_root = self.put_in(node, key, value).await?;
        self.persist(&new_root).await
    }

    /// Remove `key`, returning the new root CID, or `None` when the tree
    /// became empty. An absent key is an error.
    pub async fn delete(&self, root: Option<&Cid>, key: &str) -> PdsResult<Option<Cid>> {
        let Some(root) = root else {
            return Err(PdsError::NotFound(format!("key {key}")));
        };
        let node = self.load(root).await?;
        match self.delete_in(node, key).await? {
            Some(node) if !node.is_empty() => Ok(Some(self.persist(&node).await?)),
            _ => Ok(None),
        }
    }

    /// All `(key, value)` pairs in key order.
    pub async fn entries(&self, root: Option<&Cid>) -> PdsResult<Vec<(String, Cid)>> {
        let mut out = Vec::new();
        if let Some(root) = root {
            self.collect_entries(*root, &mut out).await?;
        }
        Ok(out)
    }

    /// Every block reachable from `root`: node blocks and record blocks,
    /// deduplicated, in depth-first key order. A missing block here is a
    /// structural error, not a soft absence.
    pub async fn walk_blocks(&self, root: &Cid) -> PdsResult<Vec<(Cid, Bytes)>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.walk_node(*root, &mut seen, &mut out).await?;
        Ok(out)
    }

    /// Persist the canonical empty node. Only ever used as the commit
    /// target of a repository whose last record was deleted.
    pub async fn persist_empty(&self) -> PdsResult<Cid> {
        self.persist(&Node::empty()).await
    }

    async fn load(&self, cid: &Cid) -> PdsResult<Node> {
        self.load_opt(cid)
            .await?
            .ok_or_else(|| PdsError::MissingBlock(cid.to_string()))
    }

    async fn load_opt(&self, cid: &Cid) -> PdsResult<Option<Node>> {
        match self.store.get(cid).await? {
            Some(bytes) => Ok(Some(Node::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, node: &Node) -> PdsResult<Cid> {
        self.store.put(&node.encode()?).await
    }

    /// The subtree covering keys immediately left of entry position `idx`.
    fn subtree_at(node: &Node, idx: usize) -> Option<Cid> {
        if idx == 0 {
            node.left
        } else {
            node.entries[idx - 1].tree
        }
    }

    /// Index of the first entry whose key is greater than `key`.
    fn insertion_index(node: &Node, key: &str) -> usize {
        node.entries
            .iter()
            .position(|entry| compare_keys(&entry.key, key) == Ordering::Greater)
            .unwrap_or(node.entries.len())
    }

    async fn get_in(&self, node: Node, key: &str) -> PdsResult<Option<Cid>> {
        let mut descend = None;
        let mut found_boundary = false;
        for (idx, entry) in node.entries.iter().enumerate() {
            match compare_keys(key, &entry.key) {
                Ordering::Equal => return Ok(Some(entry.value)),
                Ordering::Less => {
                    descend = Self::subtree_at(&node, idx);
                    found_boundary = true;
                    break;
                }
                Ordering::Greater => {}
            }
        }
        if !found_boundary {
            descend = Self::subtree_at(&node, node.entries.len());
        }
        match descend {
            None => Ok(None),
            Some(cid) => match self.load_opt(&cid).await? {
                None => Ok(None),
                Some(child) => Box::pin(self.get_in(child, key)).await,
            },
        }
    }

    async fn put_in(&self, node: Node, key: &str, value: Cid) -> PdsResult<Node> {
        if node.is_empty() {
            return Ok(Node {
                left: None,
                entries: vec![TreeEntry {
                    key: key.to_string(),
                    value,
                    tree: None,
                }],
            });
        }
        let Some(node_layer) = node.layer() else {
            return Err(PdsError::InternalError(
                "persisted node has a left pointer but no entries".to_string(),
            ));
        };
        let new_layer = key_layer(key);

        if new_layer > node_layer {
            // The key lives above this whole node: split everything around
            // it and hang the halves off a new single-entry node.
            let (left, right) = self.split_node(&node, key).await?;
            return Ok(Node {
                left,
                entries: vec![TreeEntry {
                    key: key.to_string(),
                    value,
                    tree: right,
                }],
            });
        }

        let idx = Self::insertion_index(&node, key);
        if idx > 0 && node.entries[idx - 1].key == key {
            let mut node = node;
            node.entries[idx - 1].value = value;
            return Ok(node);
        }

        if new_layer == node_layer {
            // Insert here, splitting the straddled subtree into the two
            // neighbors of the new entry.
            let mut node = node;
            let (split_left, split_right) = match Self::subtree_at(&node, idx) {
                Some(cid) => {
                    let child = self.load(&cid).await?;
                    self.split_node(&child, key).await?
                }
                None => (None, None),
            };
            if idx == 0 {
                node.left = split_left;
            } else {
                node.entries[idx - 1].tree = split_left;
            }
            node.entries.insert(
                idx,
                TreeEntry {
                    key: key.to_string(),
                    value,
                    tree: split_right,
                },
            );
            return Ok(node);
        }

        // The key belongs in a child subtree.
        let mut node = node;
        let new_child = match Self::subtree_at(&node, idx) {
            Some(cid) => {
                let child = self.load(&cid).await?;
                Box::pin(self.put_in(child, key, value)).await?
            }
            None => Node {
                left: None,
                entries: vec![TreeEntry {
                    key: key.to_string(),
                    value,
                    tree: None,
                }],
            },
        };
        let child_cid = self.persist(&new_child).await?;
        if idx == 0 {
            node.left = Some(child_cid);
        } else {
            node.entries[idx - 1].tree = Some(child_cid);
        }
        Ok(node)
    }

    /// Partition all keys reachable from `node` into those strictly less
    /// than `key` and those strictly greater, returning persisted halves.
    /// An empty half is `None`.
    async fn split_node(&self, node: &Node, key: &str) -> PdsResult<(Option<Cid>, Option<Cid>)> {
        let idx = Self::insertion_index(node, key);
        let (sub_left, sub_right) = match Self::subtree_at(node, idx) {
            Some(cid) => {
                let child = self.load(&cid).await?;
                Box::pin(self.split_node(&child, key)).await?
            }
            None => (None, None),
        };

        let left = if idx == 0 {
            sub_left
        } else {
            let mut left_node = Node {
                left: node.left,
                entries: node.entries[..idx].to_vec(),
            };
            left_node.entries[idx - 1].tree = sub_left;
            Some(self.persist(&left_node).await?)
        };

        let right = if idx == node.entries.len() {
            sub_right
        } else {
            let right_node = Node {
                left: sub_right,
                entries: node.entries[idx..].to_vec(),
            };
            Some(self.persist(&right_node).await?)
        };

        Ok((left, right))
    }

    async fn delete_in(&self, node: Node, key: &str) -> PdsResult<Option<Node>> {
        if let Some(idx) = node.entries.iter().position(|entry| entry.key == key) {
            // Found here: the subtrees either side of the entry collapse
            // into one.
            let mut node = node;
            let left_sub = Self::subtree_at(&node, idx);
            let right_sub = node.entries[idx].tree;
            let merged = self.merge(left_sub, right_sub).await?;
            node.entries.remove(idx);
            if idx == 0 {
                node.left = merged;
            } else {
                node.entries[idx - 1].tree = merged;
            }
            if node.entries.is_empty() {
                // The top layer emptied out; the merged child (if any)
                // becomes the tree.
                return match node.left {
                    None => Ok(None),
                    Some(cid) => Ok(Some(self.load(&cid).await?)),
                };
            }
            return Ok(Some(node));
        }

        let idx = Self::insertion_index(&node, key);
        let Some(sub) = Self::subtree_at(&node, idx) else {
            return Err(PdsError::NotFound(format!("key {key}")));
        };
        let child = self.load(&sub).await?;
        let new_child = Box::pin(self.delete_in(child, key)).await?;
        let mut node = node;
        let pointer = match new_child {
            Some(child) => Some(self.persist(&child).await?),
            None => None,
        };
        if idx == 0 {
            node.left = pointer;
        } else {
            node.entries[idx - 1].tree = pointer;
        }
        Ok(Some(node))
    }

    /// Merge two adjacent subtrees whose key ranges do not overlap (all of
    /// `left` sorts before all of `right`), returning the persisted result.
    async fn merge(&self, left: Option<Cid>, right: Option<Cid>) -> PdsResult<Option<Cid>> {
        match (left, right) {
            (None, None) => Ok(None),
            (Some(cid), None) | (None, Some(cid)) => Ok(Some(cid)),
            (Some(left), Some(right)) => {
                let left_node = self.load(&left).await?;
                let right_node = self.load(&right).await?;
                let merged = Box::pin(self.merge_in(left_node, right_node)).await?;
                Ok(Some(self.persist(&merged).await?))
            }
        }
    }

    async fn merge_in(&self, left: Node, right: Node) -> PdsResult<Node> {
        let (Some(left_layer), Some(right_layer)) = (left.layer(), right.layer()) else {
            return Err(PdsError::InternalError(
                "cannot merge an entry-less node".to_string(),
            ));
        };

        match left_layer.cmp(&right_layer) {
            Ordering::Greater => {
                // Right sits below left's layer: fold it into left's
                // rightmost subtree.
                let mut left = left;
                let last = left.entries.len() - 1;
                let merged = match left.entries[last].tree.take() {
                    Some(cid) => {
                        let child = self.load(&cid).await?;
                        Box::pin(self.merge_in(child, right)).await?
                    }
                    None => right,
                };
                left.entries[last].tree = Some(self.persist(&merged).await?);
                Ok(left)
            }
            Ordering::Less => {
                let mut right = right;
                let merged = match right.left.take() {
                    Some(cid) => {
                        let child = self.load(&cid).await?;
                        Box::pin(self.merge_in(left, child)).await?
                    }
                    None => left,
                };
                right.left = Some(self.persist(&merged).await?);
                Ok(right)
            }
            Ordering::Equal => {
                // Same layer: merge the boundary subtrees and concatenate.
                let mut left = left;
                let mut right = right;
                let last = left.entries.len() - 1;
                let boundary = self
                    .merge(left.entries[last].tree.take(), right.left.take())
                    .await?;
                left.entries[last].tree = boundary;
                left.entries.append(&mut right.entries);
                Ok(left)
            }
        }
    }

    async fn collect_entries(&self, cid: Cid, out: &mut Vec<(String, Cid)>) -> PdsResult<()> {
        let node = self.load(&cid).await?;
        if let Some(left) = node.left {
            Box::pin(self.collect_entries(left, out)).await?;
        }
        for entry in node.entries {
            out.push((entry.key, entry.value));
            if let Some(tree) = entry.tree {
                Box::pin(self.collect_entries(tree, out)).await?;
            }
        }
        Ok(())
    }

    async fn walk_node(
        &self,
        cid: Cid,
        seen: &mut HashSet<Cid>,
        out: &mut Vec<(Cid, Bytes)>,
    ) -> PdsResult<()> {
        if !seen.insert(cid) {
            return Ok(());
        }
        let bytes = self
            .store
            .get(&cid)
            .await?
            .ok_or_else(|| PdsError::MissingBlock(cid.to_string()))?;
        let node = Node::decode(&bytes)?;
        out.push((cid, bytes));

        if let Some(left) = node.left {
            Box::pin(self.walk_node(left, seen, out)).await?;
        }
        for entry in node.entries {
            if seen.insert(entry.value) {
                let record = self
                    .store
                    .get(&entry.value)
                    .await?
                    .ok_or_else(|| PdsError::MissingBlock(entry.value.to_string()))?;
                out.push((entry.value, record));
            }
            if let Some(tree) = entry.tree {
                Box::pin(self.walk_node(tree, seen, out)).await?;
            }
        }
        Ok(())
    }
}

pub mod node;
pub mod tree;

pub use node::{Node, TreeEntry, common_prefix_len, compare_keys, ensure_valid_key, key_layer};
pub use tree::Tree;

pub mod data;
pub mod stores;

pub use data::{bulk_record_keys, random_record, random_str};
pub use stores::{TestStores, create_test_stores};

pub mod blockstore;
pub mod car;
pub mod commit;
pub mod engine;
pub mod locks;
pub mod uri;

pub use blockstore::TrackingStore;
pub use car::{export_blocks_car, export_diff_car, export_full_car};
pub use commit::{COMMIT_VERSION, SignedCommit, UnsignedCommit};
pub use engine::{RecordOutput, RecordWriteOutput, RepoEngine};
pub use locks::DidLocks;
pub use uri::{at_uri, ensure_valid_collection, ensure_valid_did, ensure_valid_rkey, record_path};

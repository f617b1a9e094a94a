pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{FirehoseConfig, PdsConfig, RepoConfig};
pub use error::{PdsError, PdsResult};
pub use traits::{BlockStore, EventStore, KeyStore, RepoRootStore};
pub use types::{CommitInfo, PersistedEvent, RepoState, StoredKey};

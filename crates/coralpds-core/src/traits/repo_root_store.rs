use async_trait::async_trait;

use crate::error::PdsResult;
use crate::types::RepoState;

/// Durable `did → RepoState` mapping. The engine treats this as an opaque
/// external key/value store.
#[async_trait]
pub trait RepoRootStore: Send + Sync + 'static {
    async fn get(&self, did: &str) -> PdsResult<Option<RepoState>>;
    async fn put(&self, state: &RepoState) -> PdsResult<()>;
    async fn list_dids(&self) -> PdsResult<Vec<String>>;
}

use async_trait::async_trait;

use crate::error::PdsResult;
use crate::types::StoredKey;

/// Durable storage for repository signing keys.
///
/// A key is persisted the first time a repository signs anything and
/// reloaded on every later use; losing it invalidates the verifiability of
/// the whole commit chain.
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    async fn get_signing_key(&self, did: &str) -> PdsResult<Option<StoredKey>>;
    async fn put_signing_key(&self, did: &str, key: &StoredKey) -> PdsResult<()>;
}

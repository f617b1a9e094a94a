use async_trait::async_trait;

use crate::error::PdsResult;
use crate::types::PersistedEvent;

#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Append a firehose event under its already-assigned sequence number.
    async fn append_event(&self, event: &PersistedEvent) -> PdsResult<()>;

    /// Get events with seq > after_seq, ascending, up to `limit`.
    async fn get_events_after(&self, after_seq: i64, limit: usize)
    -> PdsResult<Vec<PersistedEvent>>;

    /// The maximum sequence number in the store (0 if empty).
    async fn get_max_seq(&self) -> PdsResult<i64>;
}

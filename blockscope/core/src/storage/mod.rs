use std::future::Future;

use crate::{errors::StoreError, events::Event, ledger::ChannelId};

mod elastic;
pub use elastic::{ElasticIndexStore, ElasticIndexStoreBuilder};

mod in_memory;
pub use in_memory::InMemoryIndexStore;

mod sql_lite;
pub use sql_lite::SqliteIndexStore;

/// Durable home of checkpoints and published events.
///
/// A store is bound to a single peer: checkpoints and block documents of other peers sharing the
/// same backend are never visible through it.
pub trait IndexStore {
    /// Last block fully ingested on the channel, if any.
    fn get_checkpoint(
        &self,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;

    fn put_checkpoint(
        &self,
        channel: &ChannelId,
        block_number: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Hash recorded in the block document of `block_number`, if it was published.
    fn get_block_hash(
        &self,
        channel: &ChannelId,
        block_number: u64,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Upserts the event document under its deterministic id.
    fn put_event(&self, event: &Event) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Name of the document holding a channel checkpoint.
pub fn checkpoint_index(peer: &str, channel: &ChannelId) -> String {
    format!("last_block_{}_{}", peer, channel).to_lowercase()
}

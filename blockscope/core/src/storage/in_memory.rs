use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    errors::StoreError,
    events::{Event, EventKind},
    ledger::ChannelId,
    storage::IndexStore,
};

/// An entirely in-memory index store useful for development and testing purposes.
///
/// Clones share the same documents. Published events are kept in publication order, and
/// republished documents replace earlier ones, like an upserting document store would.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndexStore {
    state: Arc<Mutex<InMemoryIndexState>>,
}

#[derive(Debug, Default)]
struct InMemoryIndexState {
    checkpoints: HashMap<ChannelId, u64>,
    checkpoint_history: Vec<(ChannelId, u64)>,
    events: Vec<Event>,
    block_hashes: BTreeMap<(ChannelId, u64), String>,
    failing_puts: Option<usize>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a checkpoint and its block hash as if the block had been ingested earlier.
    pub fn seed_block(&self, channel: &ChannelId, block_number: u64, block_hash: &str) {
        let mut state = self.lock();
        state.checkpoints.insert(channel.clone(), block_number);
        state
            .block_hashes
            .insert((channel.clone(), block_number), block_hash.to_string());
    }

    /// Makes event publication fail after `successful` more events were accepted.
    pub fn fail_puts_after(&self, successful: Option<usize>) {
        self.lock().failing_puts = successful;
    }

    /// Published events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<Event> {
        self.lock()
            .events
            .iter()
            .filter(|event| event.kind() == kind)
            .cloned()
            .collect()
    }

    /// Every checkpoint value written, oldest first.
    pub fn checkpoint_history(&self) -> Vec<(ChannelId, u64)> {
        self.lock().checkpoint_history.clone()
    }

    pub fn checkpoint(&self, channel: &ChannelId) -> Option<u64> {
        self.lock().checkpoints.get(channel).copied()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryIndexState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl IndexStore for InMemoryIndexStore {
    async fn get_checkpoint(&self, channel: &ChannelId) -> Result<Option<u64>, StoreError> {
        Ok(self.checkpoint(channel))
    }

    async fn put_checkpoint(&self, channel: &ChannelId, block_number: u64) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.checkpoints.insert(channel.clone(), block_number);
        state
            .checkpoint_history
            .push((channel.clone(), block_number));
        Ok(())
    }

    async fn get_block_hash(
        &self,
        channel: &ChannelId,
        block_number: u64,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()
            .block_hashes
            .get(&(channel.clone(), block_number))
            .cloned())
    }

    async fn put_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut state = self.lock();
        match state.failing_puts {
            Some(0) => {
                return Err(StoreError::Status {
                    status: 503,
                    body: "store unavailable".to_string(),
                })
            }
            Some(remaining) => state.failing_puts = Some(remaining - 1),
            None => {}
        }

        if let Event::Block(block) = event {
            state.block_hashes.insert(
                (block.channel_id.clone(), block.block_number),
                block.block_hash.clone(),
            );
        }

        let id = event.document_id();
        let kind = event.kind();
        match state
            .events
            .iter()
            .position(|existing| existing.kind() == kind && existing.document_id() == id)
        {
            Some(index) => state.events[index] = event.clone(),
            None => state.events.push(event.clone()),
        }
        Ok(())
    }
}

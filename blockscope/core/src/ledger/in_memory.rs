use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    errors::LedgerError,
    ledger::{ChannelId, LedgerClient, RawBlock},
};

/// An entirely in-memory ledger useful for development and testing purposes.
///
/// Clones share the same underlying chains, so a test can keep a handle to append blocks while an
/// ingestor polls another clone.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<InMemoryLedgerState>>,
}

#[derive(Debug, Default)]
struct InMemoryLedgerState {
    channels: BTreeMap<ChannelId, Vec<RawBlock>>,
    unavailable: bool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block to the channel, creating the channel if needed.
    pub fn push_block(&self, channel: &ChannelId, block: RawBlock) {
        self.lock()
            .channels
            .entry(channel.clone())
            .or_default()
            .push(block);
    }

    /// Swaps the block at `number`, simulating a ledger that was reset or replaced.
    pub fn replace_block(&self, channel: &ChannelId, number: u64, block: RawBlock) -> bool {
        let mut state = self.lock();
        let slot = state.channels.get_mut(channel).and_then(|blocks| {
            usize::try_from(number)
                .ok()
                .and_then(|index| blocks.get_mut(index))
        });
        match slot {
            Some(slot) => {
                *slot = block;
                true
            }
            None => false,
        }
    }

    /// Makes every request fail as if the peer could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryLedgerState> {
        // A poisoned lock only means a test panicked while holding it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn available(&self) -> Result<MutexGuard<'_, InMemoryLedgerState>, LedgerError> {
        let state = self.lock();
        if state.unavailable {
            return Err(LedgerError::Status {
                status: 503,
                body: "peer unavailable".to_string(),
            });
        }
        Ok(state)
    }
}

impl LedgerClient for InMemoryLedger {
    async fn list_channels(&self) -> Result<Vec<ChannelId>, LedgerError> {
        Ok(self.available()?.channels.keys().cloned().collect())
    }

    async fn tip_height(&self, channel: &ChannelId) -> Result<u64, LedgerError> {
        self.available()?
            .channels
            .get(channel)
            .map(|blocks| blocks.len() as u64)
            .ok_or_else(|| LedgerError::UnknownChannel(channel.clone()))
    }

    async fn get_block(&self, channel: &ChannelId, number: u64) -> Result<RawBlock, LedgerError> {
        let state = self.available()?;
        let blocks = state
            .channels
            .get(channel)
            .ok_or_else(|| LedgerError::UnknownChannel(channel.clone()))?;
        usize::try_from(number)
            .ok()
            .and_then(|index| blocks.get(index))
            .cloned()
            .ok_or_else(|| LedgerError::BlockNotFound {
                channel: channel.clone(),
                number,
            })
    }
}

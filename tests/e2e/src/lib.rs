//! Shared setup for the end-to-end tests.

use std::sync::{Arc, Mutex};

use blockscope_core::{
    block_ingestor::{IngestSettings, IngestionEngine},
    decoder::ProtobufEnvelopeDecoder,
    errors::LedgerError,
    ledger::{ChannelId, InMemoryLedger, LedgerClient, RawBlock},
    linking::ChaincodeLinkingKey,
    storage::InMemoryIndexStore,
    testing::{ChainFixture, FixtureBlock},
};

pub const PEER: &str = "peer0.org1.el-network.com";
pub const ORGANIZATION: &str = "org1";

pub type TestEngine = IngestionEngine<RecordingLedger, ProtobufEnvelopeDecoder, InMemoryIndexStore>;

pub fn settings() -> IngestSettings {
    IngestSettings {
        peer: PEER.to_string(),
        organization: ORGANIZATION.to_string(),
        chaincodes: vec![ChaincodeLinkingKey {
            name: "mycc".to_string(),
            linking_key: "assetId".to_string(),
            values: vec!["owner".to_string()],
        }],
    }
}

/// An in-memory ledger remembering which blocks were requested.
#[derive(Debug, Clone, Default)]
pub struct RecordingLedger {
    inner: InMemoryLedger,
    fetched: Arc<Mutex<Vec<(ChannelId, u64)>>>,
}

impl RecordingLedger {
    pub fn new(inner: InMemoryLedger) -> Self {
        Self {
            inner,
            fetched: Default::default(),
        }
    }

    pub fn inner(&self) -> &InMemoryLedger {
        &self.inner
    }

    /// Numbers of the blocks requested on `channel`, in request order.
    pub fn fetched(&self, channel: &ChannelId) -> Vec<u64> {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|(fetched_channel, _)| fetched_channel == channel)
            .map(|(_, number)| *number)
            .collect()
    }
}

impl LedgerClient for RecordingLedger {
    async fn list_channels(&self) -> Result<Vec<ChannelId>, LedgerError> {
        self.inner.list_channels().await
    }

    async fn tip_height(&self, channel: &ChannelId) -> Result<u64, LedgerError> {
        self.inner.tip_height(channel).await
    }

    async fn get_block(&self, channel: &ChannelId, number: u64) -> Result<RawBlock, LedgerError> {
        self.fetched.lock().unwrap().push((channel.clone(), number));
        self.inner.get_block(channel, number).await
    }
}

/// Appends `count` simple blocks to `channel` and returns them.
pub fn append_simple_blocks(
    ledger: &InMemoryLedger,
    chain: &mut ChainFixture,
    count: usize,
) -> Vec<FixtureBlock> {
    let channel = ChannelId::from(chain.channel());
    let blocks = chain.simple_blocks(count);
    for block in &blocks {
        ledger.push_block(&channel, block.raw.clone());
    }
    blocks
}

pub fn engine(channel: &ChannelId, ledger: &RecordingLedger, store: &InMemoryIndexStore) -> TestEngine {
    IngestionEngine::new(
        [channel.clone()],
        ledger.clone(),
        ProtobufEnvelopeDecoder::new(),
        store.clone(),
        settings(),
    )
}

use anyhow::Result;
use tokio::sync::mpsc::Sender;

mod engine;
pub use engine::{ChannelIngestor, Cursor, IngestSettings, IngestionEngine};

mod polling;
pub use polling::{PollingBlockIngestor, PollingBlockIngestorBuilder};

use crate::{ledger::ChannelId, service::Daemon};

pub trait BlockIngestorBuilder {
    type Ingestor: BlockIngestor;

    fn build(self) -> Result<Self::Ingestor>;

    /// Restricts ingestion to the given channels. All channels of the ledger are monitored when
    /// empty.
    fn channels(self, channels: Vec<ChannelId>) -> Self;

    fn progress(self, progress: Sender<IngestProgress>) -> Self;
}

pub trait BlockIngestor: Daemon {}

/// Notifications emitted by channel workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestProgress {
    Reconciled {
        channel: ChannelId,
        start_block: u64,
    },
    BlockIngested(IngestedBlock),
    /// The channel worker stopped on a fatal error and needs an operator.
    ChannelHalted {
        channel: ChannelId,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedBlock {
    pub channel: ChannelId,
    pub number: u64,
    pub block_hash: String,
    pub header_hash: Vec<u8>,
    pub transactions: usize,
    pub events: usize,
}

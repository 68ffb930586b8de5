use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::{
    sync::mpsc::Sender,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    block_ingestor::{
        BlockIngestor, BlockIngestorBuilder, ChannelIngestor, IngestProgress, IngestSettings,
        IngestionEngine,
    },
    decoder::EnvelopeDecoder,
    errors::IngestError,
    ledger::{ChannelId, LedgerClient},
    service::{Daemon, FinishHandle, ShutdownHandle},
    storage::IndexStore,
    utils::RetryPolicy,
};

const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(1);
const LIST_CHANNELS_RETRY: RetryPolicy = RetryPolicy::new(5, Duration::from_secs(2));

/// A block ingestor which follows every monitored channel by polling the ledger on a timer.
///
/// Each channel runs on its own task. A fatal error halts the affected channel only, and the
/// ingestor finishes once every channel task has ended.
#[derive(Debug)]
pub struct PollingBlockIngestor<L, D, S> {
    ledger: L,
    decoder: D,
    store: S,
    settings: IngestSettings,
    channels: Vec<ChannelId>,
    period: Duration,
    progress: Option<Sender<IngestProgress>>,
    finish_handle: FinishHandle,
}

#[derive(Debug)]
pub struct PollingBlockIngestorBuilder<L, D, S> {
    ledger: L,
    decoder: D,
    store: S,
    settings: IngestSettings,
    channels: Vec<ChannelId>,
    period: Duration,
    progress: Option<Sender<IngestProgress>>,
}

impl<L, D, S> PollingBlockIngestor<L, D, S>
where
    L: LedgerClient + Clone + Send + Sync + 'static,
    D: EnvelopeDecoder + Clone + Send + Sync + 'static,
    S: IndexStore + Clone + Send + Sync + 'static,
{
    async fn resolve_channels(&self) -> Result<Vec<ChannelId>, IngestError> {
        if !self.channels.is_empty() {
            return Ok(self.channels.clone());
        }

        let channels = LIST_CHANNELS_RETRY
            .run("list_channels", || self.ledger.list_channels())
            .await
            .map_err(|source| IngestError::Ledger {
                channel: ChannelId::from("*"),
                source,
            })?;
        info!("Monitoring all {} channels of the peer", channels.len());
        Ok(channels)
    }

    /// Worker function: reconciles a channel, then polls it on every tick until shutdown or a fatal
    /// error.
    async fn worker(
        mut ingestor: ChannelIngestor<L, D, S>,
        period: Duration,
        cancellation: CancellationToken,
        progress: Option<Sender<IngestProgress>>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reconciled = false;

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = if reconciled {
                ingestor.poll_once(&cancellation).await.map(|_| ())
            } else {
                ingestor.reconcile().await.map(|_| reconciled = true)
            };

            match result {
                Ok(()) => {}
                Err(err) if err.is_fatal() => {
                    error!("Halting channel `{}`: {}", ingestor.channel(), err);
                    if let Some(progress) = &progress {
                        let halted = IngestProgress::ChannelHalted {
                            channel: ingestor.channel().clone(),
                            reason: err.to_string(),
                        };
                        if progress.try_send(halted).is_err() {
                            debug!("Halt of channel `{}` not reported", ingestor.channel());
                        }
                    }
                    break;
                }
                Err(err) => {
                    warn!("{}. Retrying in {:?}", err, period);
                }
            }
        }

        debug!("Channel `{}` worker stopped", ingestor.channel());
    }

    async fn run(self) {
        let channels = tokio::select! {
            _ = self.finish_handle.shutdown_requested() => Ok(Vec::new()),
            channels = self.resolve_channels() => channels,
        };
        let channels = match channels {
            Ok(channels) => channels,
            Err(err) => {
                error!("Failed to resolve channels to monitor: {}", err);
                self.finish_handle.finish();
                return;
            }
        };

        let engine = IngestionEngine::new(
            channels,
            self.ledger.clone(),
            self.decoder.clone(),
            self.store.clone(),
            self.settings.clone(),
        );

        let workers = engine
            .into_channels()
            .map(|ingestor| {
                let ingestor = match &self.progress {
                    Some(progress) => ingestor.progress(progress.clone()),
                    None => ingestor,
                };
                tokio::spawn(Self::worker(
                    ingestor,
                    self.period,
                    self.finish_handle.cancellation_token(),
                    self.progress.clone(),
                ))
            })
            .collect::<Vec<_>>();

        futures_util::future::join_all(workers).await;
        debug!("Graceful shutdown finished");
        self.finish_handle.finish();
    }
}

impl<L, D, S> PollingBlockIngestorBuilder<L, D, S> {
    pub fn new(ledger: L, decoder: D, store: S, settings: IngestSettings) -> Self {
        Self {
            ledger,
            decoder,
            store,
            settings,
            channels: Vec::new(),
            period: DEFAULT_POLL_PERIOD,
            progress: None,
        }
    }

    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

impl<L, D, S> BlockIngestorBuilder for PollingBlockIngestorBuilder<L, D, S>
where
    L: LedgerClient + Clone + Send + Sync + 'static,
    D: EnvelopeDecoder + Clone + Send + Sync + 'static,
    S: IndexStore + Clone + Send + Sync + 'static,
{
    type Ingestor = PollingBlockIngestor<L, D, S>;

    fn build(self) -> Result<Self::Ingestor> {
        if self.period.is_zero() {
            anyhow::bail!("`period` must be positive");
        }

        Ok(PollingBlockIngestor {
            ledger: self.ledger,
            decoder: self.decoder,
            store: self.store,
            settings: self.settings,
            channels: self.channels,
            period: self.period,
            progress: self.progress,
            finish_handle: FinishHandle::new(),
        })
    }

    fn channels(mut self, channels: Vec<ChannelId>) -> Self {
        self.channels = channels;
        self
    }

    fn progress(mut self, progress: Sender<IngestProgress>) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl<L, D, S> BlockIngestor for PollingBlockIngestor<L, D, S>
where
    L: LedgerClient + Clone + Send + Sync + 'static,
    D: EnvelopeDecoder + Clone + Send + Sync + 'static,
    S: IndexStore + Clone + Send + Sync + 'static,
{
}

impl<L, D, S> Daemon for PollingBlockIngestor<L, D, S>
where
    L: LedgerClient + Clone + Send + Sync + 'static,
    D: EnvelopeDecoder + Clone + Send + Sync + 'static,
    S: IndexStore + Clone + Send + Sync + 'static,
{
    fn shutdown_handle(&self) -> ShutdownHandle {
        self.finish_handle.shutdown_handle()
    }

    fn start(self) {
        tokio::spawn(self.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decoder::ProtobufEnvelopeDecoder, ledger::InMemoryLedger, storage::InMemoryIndexStore,
        testing::ChainFixture,
    };

    #[tokio::test]
    async fn test_discovers_channels_and_shuts_down() {
        let ledger = InMemoryLedger::new();
        for name in ["alpha", "beta"] {
            let channel = ChannelId::from(name);
            let mut chain = ChainFixture::new(name);
            for block in chain.simple_blocks(2) {
                ledger.push_block(&channel, block.raw);
            }
        }
        let store = InMemoryIndexStore::new();
        let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(32);

        let ingestor = PollingBlockIngestorBuilder::new(
            ledger,
            ProtobufEnvelopeDecoder::new(),
            store.clone(),
            IngestSettings::default(),
        )
        .period(Duration::from_millis(10))
        .progress(progress_tx)
        .build()
        .expect("Failed to build ingestor");
        let handle = ingestor.shutdown_handle();
        ingestor.start();

        let mut ingested = 0;
        while ingested < 4 {
            if let Some(IngestProgress::BlockIngested(_)) = progress_rx.recv().await {
                ingested += 1;
            }
        }

        handle.shutdown();
        handle.finished().await;

        assert_eq!(store.checkpoint(&ChannelId::from("alpha")), Some(1));
        assert_eq!(store.checkpoint(&ChannelId::from("beta")), Some(1));
    }

    #[test]
    fn test_rejects_zero_period() {
        let result = PollingBlockIngestorBuilder::new(
            InMemoryLedger::new(),
            ProtobufEnvelopeDecoder::new(),
            InMemoryIndexStore::new(),
            IngestSettings::default(),
        )
        .period(Duration::ZERO)
        .build();
        assert!(result.is_err());
    }
}

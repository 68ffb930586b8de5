use std::time::Duration;

use blockscope_core::{
    block_ingestor::{BlockIngestorBuilder, IngestProgress, PollingBlockIngestorBuilder},
    decoder::ProtobufEnvelopeDecoder,
    ledger::{ChannelId, InMemoryLedger},
    service::Daemon,
    storage::InMemoryIndexStore,
    testing::ChainFixture,
};
use blockscope_e2e::{append_simple_blocks, settings, RecordingLedger};
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_divergent_channel_does_not_stop_others() {
    let alpha = ChannelId::from("alpha");
    let beta = ChannelId::from("beta");

    let ledger = RecordingLedger::new(InMemoryLedger::new());
    let mut alpha_chain = ChainFixture::new("alpha");
    let mut beta_chain = ChainFixture::new("beta");
    append_simple_blocks(ledger.inner(), &mut alpha_chain, 2);
    append_simple_blocks(ledger.inner(), &mut beta_chain, 3);

    let store = InMemoryIndexStore::new();
    store.seed_block(&beta, 1, &"00".repeat(32));

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(64);
    let ingestor = PollingBlockIngestorBuilder::new(
        ledger.clone(),
        ProtobufEnvelopeDecoder::new(),
        store.clone(),
        settings(),
    )
    .period(Duration::from_millis(10))
    .progress(progress_tx)
    .build()
    .expect("Failed to build ingestor");
    let handle = ingestor.shutdown_handle();
    ingestor.start();

    let mut halted = Vec::new();
    let mut alpha_blocks = Vec::new();
    timeout(TEST_TIMEOUT, async {
        while halted.is_empty() || alpha_blocks.len() < 2 {
            match progress_rx.recv().await {
                Some(IngestProgress::ChannelHalted { channel, .. }) => halted.push(channel),
                Some(IngestProgress::BlockIngested(block)) => {
                    assert_eq!(block.channel, alpha);
                    alpha_blocks.push(block.number);
                }
                Some(IngestProgress::Reconciled { .. }) => {}
                None => break,
            }
        }
    })
    .await
    .expect("Timed out waiting for progress");

    assert_eq!(halted, vec![beta.clone()]);
    assert_eq!(alpha_blocks, vec![0, 1]);

    // Alpha keeps following its chain after beta halted.
    append_simple_blocks(ledger.inner(), &mut alpha_chain, 1);
    let next = timeout(TEST_TIMEOUT, async {
        loop {
            if let Some(IngestProgress::BlockIngested(block)) = progress_rx.recv().await {
                return block;
            }
        }
    })
    .await
    .expect("Timed out waiting for the next block");
    assert_eq!(next.number, 2);

    handle.shutdown();
    timeout(TEST_TIMEOUT, handle.finished())
        .await
        .expect("Timed out waiting for shutdown");

    assert_eq!(store.checkpoint(&alpha), Some(2));
    assert_eq!(store.checkpoint(&beta), Some(1));
    assert_eq!(ledger.fetched(&beta), vec![1]);
}

#[tokio::test]
async fn test_configured_channels_only() {
    let alpha = ChannelId::from("alpha");
    let beta = ChannelId::from("beta");

    let ledger = InMemoryLedger::new();
    append_simple_blocks(&ledger, &mut ChainFixture::new("alpha"), 1);
    append_simple_blocks(&ledger, &mut ChainFixture::new("beta"), 1);
    let store = InMemoryIndexStore::new();

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(64);
    let ingestor = PollingBlockIngestorBuilder::new(
        ledger,
        ProtobufEnvelopeDecoder::new(),
        store.clone(),
        settings(),
    )
    .period(Duration::from_millis(10))
    .channels(vec![beta.clone()])
    .progress(progress_tx)
    .build()
    .expect("Failed to build ingestor");
    let handle = ingestor.shutdown_handle();
    ingestor.start();

    let block = timeout(TEST_TIMEOUT, async {
        loop {
            if let Some(IngestProgress::BlockIngested(block)) = progress_rx.recv().await {
                return block;
            }
        }
    })
    .await
    .expect("Timed out waiting for a block");
    assert_eq!(block.channel, beta);

    handle.shutdown();
    timeout(TEST_TIMEOUT, handle.finished())
        .await
        .expect("Timed out waiting for shutdown");

    assert_eq!(store.checkpoint(&alpha), None);
    assert_eq!(store.checkpoint(&beta), Some(0));
}

#[tokio::test]
async fn test_undrained_progress_does_not_block_shutdown() {
    let channel = ChannelId::from("mychannel");
    let ledger = InMemoryLedger::new();
    append_simple_blocks(&ledger, &mut ChainFixture::new("mychannel"), 3);
    let store = InMemoryIndexStore::new();

    let (progress_tx, _progress_rx) = tokio::sync::mpsc::channel(1);
    let ingestor = PollingBlockIngestorBuilder::new(
        ledger,
        ProtobufEnvelopeDecoder::new(),
        store.clone(),
        settings(),
    )
    .period(Duration::from_millis(10))
    .progress(progress_tx)
    .build()
    .expect("Failed to build ingestor");
    let handle = ingestor.shutdown_handle();
    ingestor.start();

    timeout(TEST_TIMEOUT, async {
        while store.checkpoint(&channel) != Some(2) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for the chain to be ingested");

    handle
        .shutdown_and_wait(Duration::from_secs(2))
        .await
        .expect("Ingestor did not shut down");
}

use std::{collections::HashMap, sync::Arc};

use log::{debug, error, info};
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tokio_util::sync::CancellationToken;

use crate::{
    block_ingestor::{IngestProgress, IngestedBlock},
    decoder::{BlockView, EnvelopeDecoder, TransactionRecord},
    errors::{DecodeError, IngestError, LedgerError, StoreError},
    events::{render_value, BlockEvent, EndorsementFields, Event, TransactionEvent, WriteEntry, WriteEvent},
    hasher::header_hash,
    ledger::{ChannelId, LedgerClient},
    linking::{linked_values, resolve_linking_key, ChaincodeLinkingKey},
    storage::IndexStore,
};

/// Settings shared read-only by every channel worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSettings {
    pub peer: String,
    pub organization: String,
    pub chaincodes: Vec<ChaincodeLinkingKey>,
}

/// In-memory read position of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Number of the next block to ingest.
    pub next_block: u64,
    /// Header hash of block `next_block - 1`. `None` before the first block.
    pub last_hash: Option<Vec<u8>>,
}

impl Cursor {
    fn genesis() -> Self {
        Self {
            next_block: 0,
            last_hash: None,
        }
    }
}

/// Ingests the blocks of a single channel.
///
/// The channel must be reconciled against the index store once before it can be polled.
#[derive(Debug)]
pub struct ChannelIngestor<L, D, S> {
    channel: ChannelId,
    ledger: L,
    decoder: D,
    store: S,
    settings: Arc<IngestSettings>,
    cursor: Option<Cursor>,
    progress: Option<Sender<IngestProgress>>,
}

impl<L, D, S> ChannelIngestor<L, D, S>
where
    L: LedgerClient,
    D: EnvelopeDecoder,
    S: IndexStore,
{
    pub fn new(
        channel: ChannelId,
        ledger: L,
        decoder: D,
        store: S,
        settings: Arc<IngestSettings>,
    ) -> Self {
        Self {
            channel,
            ledger,
            decoder,
            store,
            settings,
            cursor: None,
            progress: None,
        }
    }

    /// Reports every reconciliation and ingested block to `progress`.
    pub fn progress(mut self, progress: Sender<IngestProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Validates the stored checkpoint against the ledger and positions the cursor after it.
    ///
    /// Returns the number of the first block to ingest.
    pub async fn reconcile(&mut self) -> Result<u64, IngestError> {
        let checkpoint = self
            .store
            .get_checkpoint(&self.channel)
            .await
            .map_err(|err| self.store_error(err))?;

        let Some(block_number) = checkpoint else {
            info!(channel = self.channel.as_str(); "No checkpoint found, starting from genesis");
            self.cursor = Some(Cursor::genesis());
            self.notify(IngestProgress::Reconciled {
                channel: self.channel.clone(),
                start_block: 0,
            });
            return Ok(0);
        };

        let stored_hash = self
            .store
            .get_block_hash(&self.channel, block_number)
            .await
            .map_err(|err| self.store_error(err))?
            .ok_or_else(|| IngestError::MissingBlockDocument {
                channel: self.channel.clone(),
                block_number,
            })?;

        // A checkpoint past the ledger tip means the ledger was reset to a shorter chain.
        let view = match self.fetch_block(block_number).await {
            Err(IngestError::Ledger {
                source: LedgerError::BlockNotFound { .. },
                ..
            }) => {
                return Err(IngestError::CheckpointNotOnLedger {
                    channel: self.channel.clone(),
                    block_number,
                })
            }
            result => result?,
        };
        let ledger_hash = header_hash(&view.previous_hash, &view.data_hash, block_number)?;
        let ledger_hash_hex = hex::encode(ledger_hash);

        if !stored_hash.eq_ignore_ascii_case(&ledger_hash_hex) {
            return Err(IngestError::ChainDivergence {
                channel: self.channel.clone(),
                block_number,
                stored_hash,
                ledger_hash: ledger_hash_hex,
            });
        }

        let start_block = block_number + 1;
        info!(
            "Checkpoint #{} of channel `{}` matches the ledger, resuming at block #{}",
            block_number, self.channel, start_block
        );
        self.cursor = Some(Cursor {
            next_block: start_block,
            last_hash: Some(ledger_hash.to_vec()),
        });
        self.notify(IngestProgress::Reconciled {
            channel: self.channel.clone(),
            start_block,
        });

        Ok(start_block)
    }

    /// Ingests every block between the cursor and the ledger tip.
    ///
    /// Cancellation is only observed between blocks. On error the cursor stays on the failed block,
    /// so the next call retries it. Returns the number of blocks ingested.
    pub async fn poll_once(&mut self, cancellation: &CancellationToken) -> Result<u64, IngestError> {
        if self.cursor.is_none() {
            return Err(IngestError::NotReconciled(self.channel.clone()));
        }

        let tip_height = self
            .ledger
            .tip_height(&self.channel)
            .await
            .map_err(|err| self.ledger_error(err))?;

        let mut ingested = 0;
        while let Some(cursor) = self.cursor.clone() {
            if cursor.next_block >= tip_height || cancellation.is_cancelled() {
                break;
            }

            let block = self.ingest_block(&cursor).await?;
            self.cursor = Some(Cursor {
                next_block: cursor.next_block + 1,
                last_hash: Some(block.header_hash.clone()),
            });
            ingested += 1;
            self.notify(IngestProgress::BlockIngested(block));
        }

        if ingested > 0 {
            debug!(
                "Channel `{}` caught up to height {} ({} new blocks)",
                self.channel, tip_height, ingested
            );
        }
        Ok(ingested)
    }

    async fn fetch_block(&self, block_number: u64) -> Result<BlockView, IngestError> {
        let raw = self
            .ledger
            .get_block(&self.channel, block_number)
            .await
            .map_err(|err| self.ledger_error(err))?;

        let view = self
            .decoder
            .decode_block(&raw)
            .map_err(|err| self.decode_error(block_number, err))?;
        if view.number != block_number {
            return Err(self.decode_error(
                block_number,
                DecodeError::UnexpectedBlockNumber {
                    expected: block_number,
                    actual: view.number,
                },
            ));
        }

        Ok(view)
    }

    async fn ingest_block(&self, cursor: &Cursor) -> Result<IngestedBlock, IngestError> {
        let block_number = cursor.next_block;
        let view = self.fetch_block(block_number).await?;

        if let Some(expected) = &cursor.last_hash {
            if &view.previous_hash != expected {
                return Err(IngestError::BrokenHashChain {
                    channel: self.channel.clone(),
                    block_number,
                    expected: hex::encode(expected),
                    actual: hex::encode(&view.previous_hash),
                });
            }
        }

        let header_hash = header_hash(&view.previous_hash, &view.data_hash, block_number)?;
        let block_hash = hex::encode(header_hash);

        // Decode everything up front so a bad envelope never leaves a partially published block.
        let transactions = view
            .tx_entries
            .iter()
            .map(|entry| self.decoder.decode_transaction(entry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| self.decode_error(block_number, err))?;

        let events = self.block_events(&view, &block_hash, &transactions);
        for event in &events {
            self.store
                .put_event(event)
                .await
                .map_err(|err| self.store_error(err))?;
        }

        self.store
            .put_checkpoint(&self.channel, block_number)
            .await
            .map_err(|err| self.store_error(err))?;

        info!(block_number; "Block ingested on channel `{}` ({} transactions)", self.channel, transactions.len());

        Ok(IngestedBlock {
            channel: self.channel.clone(),
            number: block_number,
            block_hash,
            header_hash: header_hash.to_vec(),
            transactions: transactions.len(),
            events: events.len(),
        })
    }

    /// Builds the events of a block in publication order: for every transaction its writes then
    /// the transaction itself, and the block last.
    fn block_events(
        &self,
        view: &BlockView,
        block_hash: &str,
        transactions: &[TransactionRecord],
    ) -> Vec<Event> {
        let mut events = Vec::new();

        for (tx_index, tx) in transactions.iter().enumerate() {
            let endorsement = tx.endorsement.as_ref().map(|endorsement| {
                let writeset = endorsement
                    .rw_set
                    .writes
                    .iter()
                    .map(|write| WriteEntry {
                        namespace: write.namespace.clone(),
                        key: write.key.clone(),
                        value: render_value(&write.value),
                        is_delete: write.is_delete,
                    })
                    .collect::<Vec<_>>();

                for (write_index, write) in writeset.iter().enumerate() {
                    events.push(Event::Write(self.write_event(
                        view.number,
                        tx_index,
                        write_index,
                        tx,
                        &endorsement.chaincode_name,
                        &endorsement.chaincode_version,
                        write,
                    )));
                }

                EndorsementFields {
                    chaincode_name: endorsement.chaincode_name.clone(),
                    chaincode_version: endorsement.chaincode_version.clone(),
                    readset: endorsement.rw_set.reads.clone(),
                    writeset,
                }
            });

            events.push(Event::Transaction(TransactionEvent {
                block_number: view.number,
                tx_index,
                tx_id: tx.tx_id.clone(),
                channel_id: self.channel.clone(),
                peer: self.settings.peer.clone(),
                organization: self.settings.organization.clone(),
                created_at: tx.timestamp,
                creator: tx.creator.clone(),
                creator_org: tx.creator_org.clone(),
                transaction_type: tx.tx_type,
                validation_code: view.validation_code(tx_index),
                endorsement,
            }));
        }

        events.push(Event::Block(BlockEvent {
            block_number: view.number,
            channel_id: self.channel.clone(),
            peer: self.settings.peer.clone(),
            organization: self.settings.organization.clone(),
            block_hash: block_hash.to_string(),
            previous_hash: hex::encode(&view.previous_hash),
            data_hash: hex::encode(&view.data_hash),
            created_at: view.timestamp,
            block_type: view.tx_type,
            transactions: transactions.iter().map(|tx| tx.tx_id.clone()).collect(),
        }));

        events
    }

    #[allow(clippy::too_many_arguments)]
    fn write_event(
        &self,
        block_number: u64,
        tx_index: usize,
        write_index: usize,
        tx: &TransactionRecord,
        chaincode_name: &str,
        chaincode_version: &str,
        write: &WriteEntry,
    ) -> WriteEvent {
        let chaincodes = &self.settings.chaincodes;
        let linking_key = resolve_linking_key(chaincodes, chaincode_name, &write.value)
            .unwrap_or_else(|err| {
                error!(
                    "Write of key `{}` in tx {} on channel `{}`: {}",
                    write.key, tx.tx_id, self.channel, err
                );
                String::new()
            });

        WriteEvent {
            block_number,
            tx_index,
            write_index,
            tx_id: tx.tx_id.clone(),
            channel_id: self.channel.clone(),
            peer: self.settings.peer.clone(),
            organization: self.settings.organization.clone(),
            chaincode_name: chaincode_name.to_string(),
            chaincode_version: chaincode_version.to_string(),
            namespace: write.namespace.clone(),
            key: write.key.clone(),
            value: write.value.clone(),
            is_delete: write.is_delete,
            linking_key,
            linked_values: linked_values(chaincodes, chaincode_name, &write.value),
            created_at: tx.timestamp,
            creator: tx.creator.clone(),
            creator_org: tx.creator_org.clone(),
        }
    }

    /// Never waits on the receiver, so a slow consumer cannot hold up ingestion or shutdown.
    fn notify(&self, progress: IngestProgress) {
        let Some(sender) = &self.progress else {
            return;
        };
        match sender.try_send(progress) {
            Ok(()) => {}
            Err(TrySendError::Full(progress)) => {
                debug!(
                    "Progress buffer of channel `{}` is full, dropping {:?}",
                    self.channel, progress
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Progress receiver of channel `{}` dropped", self.channel);
            }
        }
    }

    fn ledger_error(&self, source: LedgerError) -> IngestError {
        match source {
            LedgerError::UnknownChannel(channel) => IngestError::UnknownChannel(channel),
            source => IngestError::Ledger {
                channel: self.channel.clone(),
                source,
            },
        }
    }

    fn decode_error(&self, block_number: u64, source: DecodeError) -> IngestError {
        IngestError::Decode {
            channel: self.channel.clone(),
            block_number,
            source,
        }
    }

    fn store_error(&self, source: StoreError) -> IngestError {
        IngestError::Store {
            channel: self.channel.clone(),
            source,
        }
    }
}

/// Cursors of every monitored channel, each owned by its [`ChannelIngestor`].
///
/// Channels are fully independent: an error on one channel never touches the others.
#[derive(Debug)]
pub struct IngestionEngine<L, D, S> {
    channels: HashMap<ChannelId, ChannelIngestor<L, D, S>>,
}

impl<L, D, S> IngestionEngine<L, D, S>
where
    L: LedgerClient + Clone,
    D: EnvelopeDecoder + Clone,
    S: IndexStore + Clone,
{
    pub fn new<I>(channels: I, ledger: L, decoder: D, store: S, settings: IngestSettings) -> Self
    where
        I: IntoIterator<Item = ChannelId>,
    {
        let settings = Arc::new(settings);
        Self {
            channels: channels
                .into_iter()
                .map(|channel| {
                    let ingestor = ChannelIngestor::new(
                        channel.clone(),
                        ledger.clone(),
                        decoder.clone(),
                        store.clone(),
                        settings.clone(),
                    );
                    (channel, ingestor)
                })
                .collect(),
        }
    }

    pub async fn reconcile(&mut self, channel: &ChannelId) -> Result<u64, IngestError> {
        self.ingestor_mut(channel)?.reconcile().await
    }

    pub async fn poll_once(
        &mut self,
        channel: &ChannelId,
        cancellation: &CancellationToken,
    ) -> Result<u64, IngestError> {
        self.ingestor_mut(channel)?.poll_once(cancellation).await
    }

    pub fn cursor(&self, channel: &ChannelId) -> Option<&Cursor> {
        self.channels.get(channel)?.cursor()
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.keys()
    }

    /// Hands the channel ingestors over, e.g. to run them on separate tasks.
    pub fn into_channels(self) -> impl Iterator<Item = ChannelIngestor<L, D, S>> {
        self.channels.into_values()
    }

    fn ingestor_mut(
        &mut self,
        channel: &ChannelId,
    ) -> Result<&mut ChannelIngestor<L, D, S>, IngestError> {
        self.channels
            .get_mut(channel)
            .ok_or_else(|| IngestError::UnknownChannel(channel.clone()))
    }
}

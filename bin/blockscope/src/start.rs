use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use blockscope_core::{
    block_ingestor::{BlockIngestorBuilder, IngestSettings, PollingBlockIngestorBuilder},
    config::BlockscopeConfig,
    decoder::ProtobufEnvelopeDecoder,
    ledger::{ChannelId, GatewayLedgerClient, GatewayLedgerClientBuilder},
    service::Daemon,
    storage::{ElasticIndexStoreBuilder, IndexStore, SqliteIndexStore},
};
use clap::{Parser, ValueEnum};
use log::info;

use crate::common::ConfigOptions;

/// 10 seconds.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const BLOCKSCOPE_DB_PATH: &str = "blockscope.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    /// HTTP document index
    Elastic,
    /// Local SQLite database
    Sqlite,
}

#[derive(Debug, Parser)]
pub struct Start {
    #[clap(flatten)]
    config: ConfigOptions,
    /// Where checkpoints and events are stored
    #[clap(long, env, value_enum, default_value = "elastic")]
    store: StoreBackend,
    /// Path to the database directory when using the SQLite store
    #[clap(long, env)]
    db_dir: Option<PathBuf>,
}

impl Start {
    pub async fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let ledger = ledger_client(&config)?;

        match self.store {
            StoreBackend::Elastic => {
                let store = ElasticIndexStoreBuilder::new(
                    config.elastic_url.clone(),
                    config.peer.clone(),
                )
                .index_names(config.index_names())
                .build()?;
                run_agent(&config, ledger, store).await
            }
            StoreBackend::Sqlite => {
                let db_path = self
                    .db_dir
                    .map(|db_dir| format!("{}/{}", db_dir.display(), BLOCKSCOPE_DB_PATH))
                    .unwrap_or_else(|| BLOCKSCOPE_DB_PATH.to_string());
                let store =
                    SqliteIndexStore::new(&db_path, config.peer.clone(), config.index_names())
                        .await?;
                run_agent(&config, ledger, store).await
            }
        }
    }
}

fn ledger_client(config: &BlockscopeConfig) -> Result<GatewayLedgerClient> {
    let endpoint = config.peer_endpoint()?;
    info!("Connecting to peer `{}` at {}", config.peer, endpoint.url);

    let mut builder = GatewayLedgerClientBuilder::new(endpoint.url);
    if let Some(pem) = endpoint.tls_ca_pem {
        builder = builder.tls_ca_pem(pem);
    }
    if let (Some(cert_path), Some(key_path)) = (&config.admin_cert_path, &config.admin_key_path) {
        builder = builder.identity(&std::fs::read(cert_path)?, &std::fs::read(key_path)?);
    }
    builder.build()
}

async fn run_agent<S>(config: &BlockscopeConfig, ledger: GatewayLedgerClient, store: S) -> Result<()>
where
    S: IndexStore + Clone + Send + Sync + 'static,
{
    let settings: IngestSettings = config.ingest_settings();
    let channels: Vec<ChannelId> = config.channel_ids();

    let ingestor =
        PollingBlockIngestorBuilder::new(ledger, ProtobufEnvelopeDecoder::new(), store, settings)
            .period(config.period()?)
            .channels(channels)
            .build()?;
    let ingestor_shutdown = ingestor.shutdown_handle();
    ingestor.start();

    let mut sigterm_handle =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let ctrl_c_handle = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigterm_handle.recv() => {},
        _ = ctrl_c_handle => {},
        _ = ingestor_shutdown.finished() => {},
    }

    info!("Shutting down");
    ingestor_shutdown
        .shutdown_and_wait(GRACEFUL_SHUTDOWN_TIMEOUT)
        .await?;
    Ok(())
}

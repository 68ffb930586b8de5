use std::path::PathBuf;

use crate::ledger::ChannelId;

/// Errors returned by [`LedgerClient`](crate::ledger::LedgerClient) implementations.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("channel `{0}` is not known to the ledger")]
    UnknownChannel(ChannelId),
    #[error("block #{number} not found on channel `{channel}`")]
    BlockNotFound { channel: ChannelId, number: u64 },
    #[error("unsuccessful status code {status}: {body}")]
    Status { status: u16, body: String },
    #[error("URL `{0}` cannot be used as a base")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors returned while turning raw ledger bytes into typed records.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Protobuf(#[from] prost::DecodeError),
    #[error("missing `{0}`")]
    MissingField(&'static str),
    #[error("block contains no envelopes")]
    EmptyBlock,
    #[error("endorser transaction carries no actions")]
    NoActions,
    #[error("requested block #{expected}, ledger returned block #{actual}")]
    UnexpectedBlockNumber { expected: u64, actual: u64 },
}

/// Errors returned by [`IndexStore`](crate::storage::IndexStore) implementations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("unsuccessful status code {status}: {body}")]
    Status { status: u16, body: String },
    #[error("URL `{0}` cannot be used as a base")]
    InvalidBaseUrl(String),
    #[error("block number {0} does not fit the storage column type")]
    BlockNumberOutOfRange(u64),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// A configured linking-key field exists in a write value but is not a string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkingKeyError {
    #[error("linking key `{key}` of chaincode `{chaincode}` holds a {found} value, expected a string")]
    NotAString {
        chaincode: String,
        key: String,
        found: &'static str,
    },
}

/// Block numbers above `i64::MAX` cannot be DER-encoded as a signed integer.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("block number {0} exceeds the signed 64-bit range")]
pub struct BlockNumberOverflow(pub u64);

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid polling period `{0}`")]
    InvalidPeriod(String),
    #[error("connection profile has no entry for peer `{0}`")]
    UnknownPeer(String),
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
}

/// Errors returned while provisioning index patterns and dashboards.
#[derive(thiserror::Error, Debug)]
pub enum DashboardError {
    #[error("failed to access `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create {name} index pattern: status code {status}: {body}")]
    IndexPattern {
        name: String,
        status: u16,
        body: String,
    },
    #[error("URL `{0}` cannot be used as a base")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Errors surfaced by the ingestion engine for a single channel.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("ledger request failed on channel `{channel}`: {source}")]
    Ledger {
        channel: ChannelId,
        source: LedgerError,
    },
    #[error("failed to decode block #{block_number} on channel `{channel}`: {source}")]
    Decode {
        channel: ChannelId,
        block_number: u64,
        source: DecodeError,
    },
    #[error("index store request failed on channel `{channel}`: {source}")]
    Store {
        channel: ChannelId,
        source: StoreError,
    },
    #[error(
        "chain divergence on channel `{channel}` at block #{block_number}: stored hash \
         {stored_hash}, ledger hash {ledger_hash}"
    )]
    ChainDivergence {
        channel: ChannelId,
        block_number: u64,
        stored_hash: String,
        ledger_hash: String,
    },
    #[error(
        "broken hash chain on channel `{channel}` at block #{block_number}: expected previous \
         hash {expected}, ledger reports {actual}"
    )]
    BrokenHashChain {
        channel: ChannelId,
        block_number: u64,
        expected: String,
        actual: String,
    },
    #[error("checkpoint of channel `{channel}` is block #{block_number} but no block document was found")]
    MissingBlockDocument { channel: ChannelId, block_number: u64 },
    #[error("checkpoint of channel `{channel}` is block #{block_number} but the ledger has no such block")]
    CheckpointNotOnLedger { channel: ChannelId, block_number: u64 },
    #[error(transparent)]
    BlockNumberOverflow(#[from] BlockNumberOverflow),
    #[error("channel `{0}` must be reconciled before polling")]
    NotReconciled(ChannelId),
    #[error("channel `{0}` is not managed by this engine")]
    UnknownChannel(ChannelId),
}

impl IngestError {
    /// Whether the channel worker must halt and wait for an operator.
    ///
    /// Everything else aborts the current poll cycle only and is retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ChainDivergence { .. }
                | Self::BrokenHashChain { .. }
                | Self::MissingBlockDocument { .. }
                | Self::CheckpointNotOnLedger { .. }
                | Self::BlockNumberOverflow(_)
                | Self::UnknownChannel(_)
        )
    }
}

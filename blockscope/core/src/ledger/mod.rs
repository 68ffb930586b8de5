use std::{fmt, future::Future};

use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;

mod gateway;
pub use gateway::{GatewayLedgerClient, GatewayLedgerClientBuilder};

mod in_memory;
pub use in_memory::InMemoryLedger;

/// Read access to the blocks of a permissioned ledger, scoped by channel.
///
/// Authentication is settled when the client is constructed. Implementations are cloned into every
/// channel worker, so they should be cheap to clone.
pub trait LedgerClient {
    fn list_channels(&self) -> impl Future<Output = Result<Vec<ChannelId>, LedgerError>> + Send;

    /// Number of blocks on the channel, i.e. the number of the next block to be cut.
    fn tip_height(
        &self,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    fn get_block(
        &self,
        channel: &ChannelId,
        number: u64,
    ) -> impl Future<Output = Result<RawBlock, LedgerError>> + Send;
}

/// Identifier of an independent ledger partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A serialized ledger block, exactly as returned by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock(Vec<u8>);

impl RawBlock {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for RawBlock {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawBlock {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

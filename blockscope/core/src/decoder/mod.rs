use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::{errors::DecodeError, ledger::RawBlock};

mod identity;
pub use identity::{creator_identity, Creator};

pub mod proto;

mod protobuf;
pub use protobuf::ProtobufEnvelopeDecoder;

/// Turns raw ledger bytes into typed block and transaction records.
///
/// Decoding is pure CPU work, so the trait is synchronous.
pub trait EnvelopeDecoder {
    fn decode_block(&self, raw: &RawBlock) -> Result<BlockView, DecodeError>;

    /// Decodes one entry of [`BlockView::tx_entries`].
    fn decode_transaction(&self, envelope: &[u8]) -> Result<TransactionRecord, DecodeError>;
}

/// Header-level view of a block with its transaction envelopes still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockView {
    pub number: u64,
    pub previous_hash: Vec<u8>,
    pub data_hash: Vec<u8>,
    /// Creation time of the first transaction in the block.
    pub timestamp: Option<DateTime<Utc>>,
    /// Type of the first transaction in the block.
    pub tx_type: TxType,
    pub tx_entries: Vec<Vec<u8>>,
    /// Per-transaction validation codes, indexed like `tx_entries`. Empty when the block carries
    /// no transactions filter.
    pub validation_codes: Vec<u8>,
}

impl BlockView {
    pub fn validation_code(&self, tx_index: usize) -> Option<u8> {
        self.validation_codes.get(tx_index).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub tx_id: String,
    pub channel_id: String,
    pub creator: String,
    pub creator_org: String,
    pub tx_type: TxType,
    pub timestamp: Option<DateTime<Utc>>,
    /// Present for endorser transactions only.
    pub endorsement: Option<Endorsement>,
}

/// Chaincode invocation details of an endorser transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endorsement {
    pub chaincode_name: String,
    pub chaincode_version: String,
    pub rw_set: ReadWriteSet,
}

/// Reads and writes of a transaction, flattened across namespaces in ledger order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadWriteSet {
    pub reads: Vec<Read>,
    pub writes: Vec<Write>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Read {
    pub namespace: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub namespace: String,
    pub key: String,
    pub value: Vec<u8>,
    pub is_delete: bool,
}

/// Header type of a transaction envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    Message,
    Config,
    ConfigUpdate,
    EndorserTransaction,
    OrdererTransaction,
    DeliverSeekInfo,
    ChaincodePackage,
    PeerAdminOperation,
    TokenTransaction,
    Unrecognized,
}

impl TxType {
    pub const ALL: [TxType; 10] = [
        Self::Message,
        Self::Config,
        Self::ConfigUpdate,
        Self::EndorserTransaction,
        Self::OrdererTransaction,
        Self::DeliverSeekInfo,
        Self::ChaincodePackage,
        Self::PeerAdminOperation,
        Self::TokenTransaction,
        Self::Unrecognized,
    ];

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Message,
            1 => Self::Config,
            2 => Self::ConfigUpdate,
            3 => Self::EndorserTransaction,
            4 => Self::OrdererTransaction,
            5 => Self::DeliverSeekInfo,
            6 => Self::ChaincodePackage,
            8 => Self::PeerAdminOperation,
            9 => Self::TokenTransaction,
            _ => Self::Unrecognized,
        }
    }

    /// The wire code of this type. `None` for [`TxType::Unrecognized`].
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Message => Some(0),
            Self::Config => Some(1),
            Self::ConfigUpdate => Some(2),
            Self::EndorserTransaction => Some(3),
            Self::OrdererTransaction => Some(4),
            Self::DeliverSeekInfo => Some(5),
            Self::ChaincodePackage => Some(6),
            Self::PeerAdminOperation => Some(8),
            Self::TokenTransaction => Some(9),
            Self::Unrecognized => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::Config => "CONFIG",
            Self::ConfigUpdate => "CONFIG_UPDATE",
            Self::EndorserTransaction => "ENDORSER_TRANSACTION",
            Self::OrdererTransaction => "ORDERER_TRANSACTION",
            Self::DeliverSeekInfo => "DELIVER_SEEK_INFO",
            Self::ChaincodePackage => "CHAINCODE_PACKAGE",
            Self::PeerAdminOperation => "PEER_ADMIN_OPERATION",
            Self::TokenTransaction => "TOKEN_TRANSACTION",
            Self::Unrecognized => "UNRECOGNIZED_TYPE",
        }
    }

    pub fn is_endorser(&self) -> bool {
        matches!(self, Self::EndorserTransaction)
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TxType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Renders a transaction header type code as its display name.
pub fn type_code_to_info(code: i32) -> &'static str {
    TxType::from_code(code).as_str()
}

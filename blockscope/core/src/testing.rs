//! Protobuf block fixtures for tests.
//!
//! Fixtures produce blocks that are byte-compatible with what a peer serves, so they exercise the
//! real decoder and hasher.

use prost::Message;
use sha2::{Digest, Sha256};

use crate::{
    decoder::proto,
    hasher::{block_hash, header_hash},
    ledger::RawBlock,
};

/// Certificate placed in fixture creators.
pub const FIXTURE_CERT_PEM: &str = "-----BEGIN CERTIFICATE-----\n\
MIICKzCCAdGgAwIBAgIRAKbnJ0a2hhZ0Lm9yZzEuZWwtbmV0d29yay5jb20wCgYI\n\
-----END CERTIFICATE-----\n";

pub const FIXTURE_MSP_ID: &str = "Org1MSP";

const FIXTURE_EPOCH_SECONDS: i64 = 1_700_000_000;

const HEADER_TYPE_CONFIG: i32 = 1;
const HEADER_TYPE_ENDORSER_TRANSACTION: i32 = 3;

#[derive(Debug, Clone)]
enum TxKind {
    Config,
    Endorser {
        chaincode: String,
        version: String,
        namespaces: Vec<(String, proto::KvRwSet)>,
        with_actions: bool,
    },
    Raw(i32),
}

/// A transaction envelope under construction.
#[derive(Debug, Clone)]
pub struct TxFixture {
    tx_id: String,
    channel: String,
    creator: Vec<u8>,
    timestamp_seconds: i64,
    kind: TxKind,
}

impl TxFixture {
    pub fn endorser(tx_id: &str, channel: &str, chaincode: &str, version: &str) -> Self {
        Self::with_kind(
            tx_id,
            channel,
            TxKind::Endorser {
                chaincode: chaincode.to_string(),
                version: version.to_string(),
                namespaces: Vec::new(),
                with_actions: true,
            },
        )
    }

    pub fn config(channel: &str) -> Self {
        Self::with_kind("", channel, TxKind::Config)
    }

    /// A transaction with an arbitrary header type and no payload data.
    pub fn of_type(tx_id: &str, channel: &str, header_type: i32) -> Self {
        Self::with_kind(tx_id, channel, TxKind::Raw(header_type))
    }

    fn with_kind(tx_id: &str, channel: &str, kind: TxKind) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            channel: channel.to_string(),
            creator: proto::SerializedIdentity {
                mspid: FIXTURE_MSP_ID.to_string(),
                id_bytes: FIXTURE_CERT_PEM.as_bytes().to_vec(),
            }
            .encode_to_vec(),
            timestamp_seconds: FIXTURE_EPOCH_SECONDS,
            kind,
        }
    }

    /// Replaces the serialized creator identity with arbitrary bytes.
    pub fn creator(mut self, creator: Vec<u8>) -> Self {
        self.creator = creator;
        self
    }

    pub fn timestamp(mut self, seconds: i64) -> Self {
        self.timestamp_seconds = seconds;
        self
    }

    pub fn read(mut self, namespace: &str, key: &str) -> Self {
        if let Some(kv) = self.namespace(namespace) {
            kv.reads.push(proto::KvRead {
                key: key.to_string(),
            });
        }
        self
    }

    pub fn write(mut self, namespace: &str, key: &str, value: &[u8]) -> Self {
        if let Some(kv) = self.namespace(namespace) {
            kv.writes.push(proto::KvWrite {
                key: key.to_string(),
                is_delete: false,
                value: value.to_vec(),
            });
        }
        self
    }

    pub fn delete(mut self, namespace: &str, key: &str) -> Self {
        if let Some(kv) = self.namespace(namespace) {
            kv.writes.push(proto::KvWrite {
                key: key.to_string(),
                is_delete: true,
                value: Vec::new(),
            });
        }
        self
    }

    /// Produces an endorser transaction whose payload has no actions.
    pub fn without_actions(mut self) -> Self {
        if let TxKind::Endorser { with_actions, .. } = &mut self.kind {
            *with_actions = false;
        }
        self
    }

    fn namespace(&mut self, namespace: &str) -> Option<&mut proto::KvRwSet> {
        let TxKind::Endorser { namespaces, .. } = &mut self.kind else {
            return None;
        };

        let index = match namespaces.iter().position(|(name, _)| name == namespace) {
            Some(index) => index,
            None => {
                namespaces.push((namespace.to_string(), proto::KvRwSet::default()));
                namespaces.len() - 1
            }
        };
        namespaces.get_mut(index).map(|(_, kv)| kv)
    }

    /// Serializes the transaction as a block data entry.
    pub fn envelope(&self) -> Vec<u8> {
        let (header_type, data) = match &self.kind {
            TxKind::Config => (HEADER_TYPE_CONFIG, Vec::new()),
            TxKind::Raw(header_type) => (*header_type, Vec::new()),
            TxKind::Endorser {
                chaincode,
                version,
                namespaces,
                with_actions,
            } => (
                HEADER_TYPE_ENDORSER_TRANSACTION,
                endorser_transaction(chaincode, version, namespaces, *with_actions),
            ),
        };

        let channel_header = proto::ChannelHeader {
            r#type: header_type,
            version: 0,
            timestamp: Some(proto::Timestamp {
                seconds: self.timestamp_seconds,
                nanos: 0,
            }),
            channel_id: self.channel.clone(),
            tx_id: self.tx_id.clone(),
            epoch: 0,
        };
        let signature_header = proto::SignatureHeader {
            creator: self.creator.clone(),
            nonce: self.tx_id.as_bytes().to_vec(),
        };
        let payload = proto::Payload {
            header: Some(proto::Header {
                channel_header: channel_header.encode_to_vec(),
                signature_header: signature_header.encode_to_vec(),
            }),
            data,
        };

        proto::Envelope {
            payload: payload.encode_to_vec(),
            signature: Vec::new(),
        }
        .encode_to_vec()
    }
}

fn endorser_transaction(
    chaincode: &str,
    version: &str,
    namespaces: &[(String, proto::KvRwSet)],
    with_actions: bool,
) -> Vec<u8> {
    if !with_actions {
        return proto::Transaction { actions: vec![] }.encode_to_vec();
    }

    let results = proto::TxReadWriteSet {
        data_model: 0,
        ns_rwset: namespaces
            .iter()
            .map(|(namespace, kv)| proto::NsReadWriteSet {
                namespace: namespace.clone(),
                rwset: kv.encode_to_vec(),
            })
            .collect(),
    };
    let chaincode_action = proto::ChaincodeAction {
        results: results.encode_to_vec(),
        events: Vec::new(),
        chaincode_id: Some(proto::ChaincodeId {
            path: String::new(),
            name: chaincode.to_string(),
            version: version.to_string(),
        }),
    };
    let response_payload = proto::ProposalResponsePayload {
        proposal_hash: Vec::new(),
        extension: chaincode_action.encode_to_vec(),
    };
    let action_payload = proto::ChaincodeActionPayload {
        chaincode_proposal_payload: Vec::new(),
        action: Some(proto::ChaincodeEndorsedAction {
            proposal_response_payload: response_payload.encode_to_vec(),
        }),
    };

    proto::Transaction {
        actions: vec![proto::TransactionAction {
            header: Vec::new(),
            payload: action_payload.encode_to_vec(),
        }],
    }
    .encode_to_vec()
}

/// A block under construction.
#[derive(Debug, Clone)]
pub struct BlockFixture {
    number: u64,
    previous_hash: Vec<u8>,
    transactions: Vec<TxFixture>,
    validation_codes: Option<Vec<u8>>,
}

/// A serialized fixture block together with the header fields used to build it.
#[derive(Debug, Clone)]
pub struct FixtureBlock {
    pub raw: RawBlock,
    pub number: u64,
    pub previous_hash: Vec<u8>,
    pub data_hash: Vec<u8>,
}

impl BlockFixture {
    pub fn new(number: u64, previous_hash: Vec<u8>) -> Self {
        Self {
            number,
            previous_hash,
            transactions: Vec::new(),
            validation_codes: None,
        }
    }

    pub fn transaction(mut self, transaction: TxFixture) -> Self {
        self.transactions.push(transaction);
        self
    }

    /// Overrides the transactions filter. Every transaction is valid (code 0) by default.
    pub fn validation_codes(mut self, codes: Vec<u8>) -> Self {
        self.validation_codes = Some(codes);
        self
    }

    pub fn build(self) -> FixtureBlock {
        let envelopes = self
            .transactions
            .iter()
            .map(TxFixture::envelope)
            .collect::<Vec<_>>();

        let mut hasher = Sha256::new();
        for envelope in &envelopes {
            hasher.update(envelope);
        }
        let data_hash = hasher.finalize().to_vec();

        let validation_codes = self
            .validation_codes
            .unwrap_or_else(|| vec![0; envelopes.len()]);

        let block = proto::Block {
            header: Some(proto::BlockHeader {
                number: self.number,
                previous_hash: self.previous_hash.clone(),
                data_hash: data_hash.clone(),
            }),
            data: Some(proto::BlockData { data: envelopes }),
            metadata: Some(proto::BlockMetadata {
                metadata: vec![Vec::new(), Vec::new(), validation_codes, Vec::new()],
            }),
        };

        FixtureBlock {
            raw: RawBlock::new(block.encode_to_vec()),
            number: self.number,
            previous_hash: self.previous_hash,
            data_hash,
        }
    }
}

impl FixtureBlock {
    /// Hex header hash, as stored in block documents.
    pub fn hash(&self) -> String {
        block_hash(&self.previous_hash, &self.data_hash, self.number)
            .expect("fixture block number out of range")
    }

    /// Raw header hash, as carried by the next block's `previous_hash`.
    pub fn header_hash(&self) -> Vec<u8> {
        header_hash(&self.previous_hash, &self.data_hash, self.number)
            .expect("fixture block number out of range")
            .to_vec()
    }
}

/// Builds consecutive blocks of one channel linked by header hash.
#[derive(Debug, Clone)]
pub struct ChainFixture {
    channel: String,
    next_number: u64,
    previous_hash: Vec<u8>,
}

impl ChainFixture {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            next_number: 0,
            previous_hash: Vec::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Appends a block made of the given transactions.
    pub fn next_block(&mut self, transactions: Vec<TxFixture>) -> FixtureBlock {
        let block = transactions
            .into_iter()
            .fold(
                BlockFixture::new(self.next_number, self.previous_hash.clone()),
                BlockFixture::transaction,
            )
            .build();

        self.previous_hash = block.header_hash();
        self.next_number += 1;
        block
    }

    /// Appends a block with a single endorser transaction writing `key{number}` in `ns1`.
    pub fn next_simple_block(&mut self) -> FixtureBlock {
        let number = self.next_number;
        let tx = TxFixture::endorser(
            &format!("tx-{}-{}", self.channel, number),
            &self.channel,
            "mycc",
            "1.0",
        )
        .timestamp(FIXTURE_EPOCH_SECONDS + number as i64)
        .write("ns1", &format!("key{}", number), br#"{"id":"asset"}"#);
        self.next_block(vec![tx])
    }

    /// Appends `count` simple blocks.
    pub fn simple_blocks(&mut self, count: usize) -> Vec<FixtureBlock> {
        (0..count).map(|_| self.next_simple_block()).collect()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    decoder::{Read, TxType},
    ledger::ChannelId,
};

/// Names of the indices receiving each kind of event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexNames {
    pub block: String,
    pub transaction: String,
    pub key: String,
}

impl Default for IndexNames {
    fn default() -> Self {
        Self {
            block: "block".to_string(),
            transaction: "transaction".to_string(),
            key: "key".to_string(),
        }
    }
}

impl IndexNames {
    /// Index receiving events of `kind`, lower-cased as the index store requires.
    pub fn index_for(&self, kind: EventKind) -> String {
        match kind {
            EventKind::Block => &self.block,
            EventKind::Transaction => &self.transaction,
            EventKind::Write => &self.key,
        }
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Block,
    Transaction,
    Write,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Transaction => "transaction",
            Self::Write => "key",
        }
    }
}

/// A document published to the index store.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Block(BlockEvent),
    Transaction(TransactionEvent),
    Write(WriteEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockEvent {
    pub block_number: u64,
    pub channel_id: ChannelId,
    pub peer: String,
    pub organization: String,
    pub block_hash: String,
    pub previous_hash: String,
    pub data_hash: String,
    pub created_at: Option<DateTime<Utc>>,
    pub block_type: TxType,
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionEvent {
    pub block_number: u64,
    pub tx_index: usize,
    pub tx_id: String,
    pub channel_id: ChannelId,
    pub peer: String,
    pub organization: String,
    pub created_at: Option<DateTime<Utc>>,
    pub creator: String,
    pub creator_org: String,
    pub transaction_type: TxType,
    pub validation_code: Option<u8>,
    #[serde(flatten)]
    pub endorsement: Option<EndorsementFields>,
}

/// Fields only endorser transactions carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndorsementFields {
    pub chaincode_name: String,
    pub chaincode_version: String,
    pub readset: Vec<Read>,
    pub writeset: Vec<WriteEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteEntry {
    pub namespace: String,
    pub key: String,
    pub value: Value,
    #[serde(rename = "isDelete")]
    pub is_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteEvent {
    pub block_number: u64,
    pub tx_index: usize,
    pub write_index: usize,
    pub tx_id: String,
    pub channel_id: ChannelId,
    pub peer: String,
    pub organization: String,
    pub chaincode_name: String,
    pub chaincode_version: String,
    pub namespace: String,
    pub key: String,
    pub value: Value,
    #[serde(rename = "isDelete")]
    pub is_delete: bool,
    pub linking_key: String,
    pub linked_values: Map<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub creator: String,
    pub creator_org: String,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Block(_) => EventKind::Block,
            Self::Transaction(_) => EventKind::Transaction,
            Self::Write(_) => EventKind::Write,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Self::Block(event) => &event.channel_id,
            Self::Transaction(event) => &event.channel_id,
            Self::Write(event) => &event.channel_id,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            Self::Block(event) => event.block_number,
            Self::Transaction(event) => event.block_number,
            Self::Write(event) => event.block_number,
        }
    }

    /// Stable id of the document, so that republishing a block overwrites its documents.
    pub fn document_id(&self) -> String {
        match self {
            Self::Block(event) => {
                format!("{}_{}_{}", event.peer, event.channel_id, event.block_number)
            }
            Self::Transaction(event) => format!(
                "{}_{}_{}_{}",
                event.peer, event.channel_id, event.block_number, event.tx_index
            ),
            Self::Write(event) => format!(
                "{}_{}_{}_{}_{}",
                event.peer, event.channel_id, event.block_number, event.tx_index, event.write_index
            ),
        }
    }

    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Block(event) => serde_json::to_value(event),
            Self::Transaction(event) => serde_json::to_value(event),
            Self::Write(event) => serde_json::to_value(event),
        }
    }
}

/// Renders a written value: parsed when it is JSON, as text otherwise.
pub fn render_value(value: &[u8]) -> Value {
    serde_json::from_slice(value)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(value).into_owned()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn block_event() -> BlockEvent {
        BlockEvent {
            block_number: 4,
            channel_id: ChannelId::from("mychannel"),
            peer: "peer0.org1.el-network.com".to_string(),
            organization: "org1".to_string(),
            block_hash: "aa".to_string(),
            previous_hash: "bb".to_string(),
            data_hash: "cc".to_string(),
            created_at: None,
            block_type: TxType::EndorserTransaction,
            transactions: vec!["tx-1".to_string()],
        }
    }

    fn transaction_event(endorsement: Option<EndorsementFields>) -> TransactionEvent {
        TransactionEvent {
            block_number: 4,
            tx_index: 1,
            tx_id: "tx-1".to_string(),
            channel_id: ChannelId::from("mychannel"),
            peer: "peer0".to_string(),
            organization: "org1".to_string(),
            created_at: None,
            creator: "creator".to_string(),
            creator_org: "Org1MSP".to_string(),
            transaction_type: TxType::Config,
            validation_code: Some(0),
            endorsement,
        }
    }

    #[test]
    fn test_document_ids() {
        let block = Event::Block(block_event());
        assert_eq!(block.document_id(), "peer0.org1.el-network.com_mychannel_4");
        assert_eq!(block.kind(), EventKind::Block);

        let tx = Event::Transaction(transaction_event(None));
        assert_eq!(tx.document_id(), "peer0_mychannel_4_1");
    }

    #[test]
    fn test_block_document_fields() {
        let document = Event::Block(block_event()).to_document().unwrap();
        assert_eq!(document["block_number"], json!(4));
        assert_eq!(document["block_hash"], json!("aa"));
        assert_eq!(document["channel_id"], json!("mychannel"));
        assert_eq!(document["block_type"], json!("ENDORSER_TRANSACTION"));
        assert_eq!(document["transactions"], json!(["tx-1"]));
    }

    #[test]
    fn test_transaction_document_flattens_endorsement() {
        let plain = Event::Transaction(transaction_event(None))
            .to_document()
            .unwrap();
        assert!(plain.get("chaincode_name").is_none());
        assert!(plain.get("writeset").is_none());
        assert_eq!(plain["transaction_type"], json!("CONFIG"));

        let endorsed = Event::Transaction(transaction_event(Some(EndorsementFields {
            chaincode_name: "mycc".to_string(),
            chaincode_version: "1.0".to_string(),
            readset: vec![],
            writeset: vec![WriteEntry {
                namespace: "ns1".to_string(),
                key: "k1".to_string(),
                value: json!({"a": 1}),
                is_delete: false,
            }],
        })))
        .to_document()
        .unwrap();
        assert_eq!(endorsed["chaincode_name"], json!("mycc"));
        assert_eq!(endorsed["writeset"][0]["isDelete"], json!(false));
        assert_eq!(endorsed["writeset"][0]["value"]["a"], json!(1));
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(br#"{"a":"b"}"#), json!({"a": "b"}));
        assert_eq!(render_value(b"plain text"), json!("plain text"));
        assert_eq!(render_value(b""), json!(""));
    }

    #[test]
    fn test_index_names_are_lowercased() {
        let names = IndexNames {
            block: "Block".to_string(),
            transaction: "TX".to_string(),
            key: "key".to_string(),
        };
        assert_eq!(names.index_for(EventKind::Block), "block");
        assert_eq!(names.index_for(EventKind::Transaction), "tx");
        assert_eq!(names.index_for(EventKind::Write), "key");
    }
}

use chrono::{DateTime, Utc};
use prost::Message;

use crate::{
    decoder::{
        creator_identity,
        proto::{self, TRANSACTIONS_FILTER_INDEX},
        BlockView, EnvelopeDecoder, Endorsement, Read, ReadWriteSet, TransactionRecord, TxType,
        Write,
    },
    errors::DecodeError,
    ledger::RawBlock,
};

/// Decodes blocks serialized in the ledger's protobuf format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufEnvelopeDecoder;

impl ProtobufEnvelopeDecoder {
    pub fn new() -> Self {
        Self
    }
}

struct EnvelopeHeaders {
    channel_header: proto::ChannelHeader,
    signature_header: proto::SignatureHeader,
    data: Vec<u8>,
}

fn decode_envelope(bytes: &[u8]) -> Result<EnvelopeHeaders, DecodeError> {
    let envelope = proto::Envelope::decode(bytes)?;
    let payload = proto::Payload::decode(envelope.payload.as_slice())?;
    let header = payload
        .header
        .ok_or(DecodeError::MissingField("payload.header"))?;

    Ok(EnvelopeHeaders {
        channel_header: proto::ChannelHeader::decode(header.channel_header.as_slice())?,
        signature_header: proto::SignatureHeader::decode(header.signature_header.as_slice())?,
        data: payload.data,
    })
}

fn to_datetime(timestamp: Option<proto::Timestamp>) -> Option<DateTime<Utc>> {
    let timestamp = timestamp?;
    DateTime::from_timestamp(timestamp.seconds, u32::try_from(timestamp.nanos).ok()?)
}

fn decode_endorsement(transaction: &[u8]) -> Result<Endorsement, DecodeError> {
    let transaction = proto::Transaction::decode(transaction)?;
    // Only the first action carries the chaincode results of a standard invocation.
    let action = transaction.actions.first().ok_or(DecodeError::NoActions)?;

    let action_payload = proto::ChaincodeActionPayload::decode(action.payload.as_slice())?;
    let endorsed = action_payload
        .action
        .ok_or(DecodeError::MissingField("chaincode_action_payload.action"))?;
    let response_payload =
        proto::ProposalResponsePayload::decode(endorsed.proposal_response_payload.as_slice())?;
    let chaincode_action = proto::ChaincodeAction::decode(response_payload.extension.as_slice())?;
    let chaincode_id = chaincode_action.chaincode_id.unwrap_or_default();

    let tx_rw_set = proto::TxReadWriteSet::decode(chaincode_action.results.as_slice())?;
    let mut rw_set = ReadWriteSet::default();
    for ns in tx_rw_set.ns_rwset {
        let kv = proto::KvRwSet::decode(ns.rwset.as_slice())?;
        rw_set.writes.extend(kv.writes.into_iter().map(|write| Write {
            namespace: ns.namespace.clone(),
            key: write.key,
            value: write.value,
            is_delete: write.is_delete,
        }));
        rw_set.reads.extend(kv.reads.into_iter().map(|read| Read {
            namespace: ns.namespace.clone(),
            key: read.key,
        }));
    }

    Ok(Endorsement {
        chaincode_name: chaincode_id.name,
        chaincode_version: chaincode_id.version,
        rw_set,
    })
}

impl EnvelopeDecoder for ProtobufEnvelopeDecoder {
    fn decode_block(&self, raw: &RawBlock) -> Result<BlockView, DecodeError> {
        let block = proto::Block::decode(raw.as_ref())?;
        let header = block
            .header
            .ok_or(DecodeError::MissingField("block.header"))?;
        let tx_entries = block.data.map(|data| data.data).unwrap_or_default();
        let first = tx_entries.first().ok_or(DecodeError::EmptyBlock)?;
        let first = decode_envelope(first)?;

        let validation_codes = block
            .metadata
            .and_then(|mut metadata| {
                (metadata.metadata.len() > TRANSACTIONS_FILTER_INDEX)
                    .then(|| metadata.metadata.swap_remove(TRANSACTIONS_FILTER_INDEX))
            })
            .unwrap_or_default();

        Ok(BlockView {
            number: header.number,
            previous_hash: header.previous_hash,
            data_hash: header.data_hash,
            timestamp: to_datetime(first.channel_header.timestamp),
            tx_type: TxType::from_code(first.channel_header.r#type),
            tx_entries,
            validation_codes,
        })
    }

    fn decode_transaction(&self, envelope: &[u8]) -> Result<TransactionRecord, DecodeError> {
        let headers = decode_envelope(envelope)?;
        let tx_type = TxType::from_code(headers.channel_header.r#type);
        let creator = creator_identity(&headers.signature_header.creator);

        let endorsement = if tx_type.is_endorser() {
            Some(decode_endorsement(&headers.data)?)
        } else {
            None
        };

        Ok(TransactionRecord {
            tx_id: headers.channel_header.tx_id,
            channel_id: headers.channel_header.channel_id,
            creator: creator.identity,
            creator_org: creator.organization,
            tx_type,
            timestamp: to_datetime(headers.channel_header.timestamp),
            endorsement,
        })
    }
}

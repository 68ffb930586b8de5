//! Block header hashing.
//!
//! The ledger identifies a block by the SHA-256 digest of the DER encoding of
//!
//! ```text
//! SEQUENCE {
//!     number        INTEGER,
//!     previous_hash OCTET STRING,
//!     data_hash     OCTET STRING,
//! }
//! ```
//!
//! The output must match the ledger byte for byte since it is compared against hashes stored in
//! the index and against the `previous_hash` of the following block.

use sha2::{Digest, Sha256};

use crate::errors::BlockNumberOverflow;

const DER_INTEGER: u8 = 0x02;
const DER_OCTET_STRING: u8 = 0x04;
const DER_SEQUENCE: u8 = 0x30;

/// Computes the header hash of a block as a lowercase hex string.
pub fn block_hash(
    previous_hash: &[u8],
    data_hash: &[u8],
    number: u64,
) -> Result<String, BlockNumberOverflow> {
    Ok(hex::encode(header_hash(previous_hash, data_hash, number)?))
}

/// Computes the raw header hash of a block.
///
/// This is the value the next block carries as its `previous_hash`.
pub fn header_hash(
    previous_hash: &[u8],
    data_hash: &[u8],
    number: u64,
) -> Result<[u8; 32], BlockNumberOverflow> {
    let encoded = encode_header(previous_hash, data_hash, number)?;
    Ok(Sha256::digest(&encoded).into())
}

/// DER-encodes a block header.
pub fn encode_header(
    previous_hash: &[u8],
    data_hash: &[u8],
    number: u64,
) -> Result<Vec<u8>, BlockNumberOverflow> {
    let number = i64::try_from(number).map_err(|_| BlockNumberOverflow(number))?;

    let mut body = Vec::with_capacity(previous_hash.len() + data_hash.len() + 16);
    write_tlv(&mut body, DER_INTEGER, &integer_content(number));
    write_tlv(&mut body, DER_OCTET_STRING, previous_hash);
    write_tlv(&mut body, DER_OCTET_STRING, data_hash);

    let mut encoded = Vec::with_capacity(body.len() + 6);
    write_tlv(&mut encoded, DER_SEQUENCE, &body);
    Ok(encoded)
}

/// Minimal two's complement big-endian representation of a non-negative integer.
fn integer_content(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // A leading zero byte is redundant when the next byte does not have its sign bit set.
    while start < bytes.len() - 1 && bytes[start] == 0 && bytes[start + 1] & 0x80 == 0 {
        start += 1;
    }
    bytes[start..].to_vec()
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    write_length(out, content.len());
    out.extend_from_slice(content);
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }

    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|byte| **byte == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

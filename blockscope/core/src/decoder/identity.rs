use prost::Message;

use crate::decoder::proto::SerializedIdentity;

/// Rendered creator of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// PEM certificate of the creator.
    pub identity: String,
    /// MSP id of the creator's organization.
    pub organization: String,
}

/// Renders the `creator` bytes of a signature header.
///
/// Creators that are not a serialized identity wrapping a PEM certificate are rendered as text,
/// with line breaks replaced by `.`, for both fields.
pub fn creator_identity(creator: &[u8]) -> Creator {
    match SerializedIdentity::decode(creator) {
        Ok(identity) if is_pem(&identity.id_bytes) => Creator {
            identity: String::from_utf8_lossy(&identity.id_bytes).into_owned(),
            organization: identity.mspid,
        },
        _ => {
            let fallback = String::from_utf8_lossy(creator).replace('\n', ".");
            Creator {
                identity: fallback.clone(),
                organization: fallback,
            }
        }
    }
}

fn is_pem(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    match text.find("-----BEGIN ") {
        Some(begin) => text[begin..].contains("-----END "),
        None => false,
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::LinkingKeyError;

/// Declares which field of a chaincode's JSON values links related writes together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaincodeLinkingKey {
    pub name: String,
    #[serde(alias = "linking_key")]
    pub linking_key: String,
    /// Value fields copied into write events alongside the linking key.
    #[serde(default)]
    pub values: Vec<String>,
}

/// Extracts the linking key of a write made by `chaincode`.
///
/// Returns an empty string when the chaincode is not configured, when the value is not a JSON
/// object, or when the field is absent or null.
pub fn resolve_linking_key(
    chaincodes: &[ChaincodeLinkingKey],
    chaincode: &str,
    value: &Value,
) -> Result<String, LinkingKeyError> {
    let Some(config) = chaincodes.iter().find(|config| config.name == chaincode) else {
        return Ok(String::new());
    };

    match value.get(&config.linking_key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(key)) => Ok(key.clone()),
        Some(other) => Err(LinkingKeyError::NotAString {
            chaincode: chaincode.to_string(),
            key: config.linking_key.clone(),
            found: json_type_name(other),
        }),
    }
}

/// Copies the configured `values` fields of a write made by `chaincode`.
pub fn linked_values(
    chaincodes: &[ChaincodeLinkingKey],
    chaincode: &str,
    value: &Value,
) -> Map<String, Value> {
    chaincodes
        .iter()
        .find(|config| config.name == chaincode)
        .map(|config| {
            config
                .values
                .iter()
                .filter_map(|field| Some((field.clone(), value.get(field)?.clone())))
                .collect()
        })
        .unwrap_or_default()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

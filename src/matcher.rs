//! Classifies one raw trace record into a contract-lifecycle event, a state
//! event, or nothing.
//!
//! The decision procedure recognizes the key family, parses it with the
//! [`crate::key_codec`], and then either decodes a `ContractInfo` protobuf
//! (contract-info writes) or passes the value through best-effort
//! UTF-8/JSON decoding (everything else). Malformed *keys* (wrong family,
//! too short, bad `ContractInfo` protobuf) are decode errors and are
//! dropped silently, continuing the batch. Malformed base64 on the wrapping
//! trace record itself is treated as a hard error, since that indicates a
//! corrupt record rather than an ordinary on-chain value.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::contract_info::decode_contract_info;
use crate::error::MatcherError;
use crate::key_codec::{self, ChainVariant, KeyFamily};
use crate::model::CodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceOperation {
    Write,
    Delete,
}

/// `metadata.blockHeight` and `blockTimeUnixMs` may arrive as either a JSON
/// number or an integer-valued string; this accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexibleU64 {
    Number(u64),
    String(#[serde(with = "flexible_u64_string")] u64),
}

impl FlexibleU64 {
    pub fn value(self) -> u64 {
        match self {
            FlexibleU64::Number(n) => n,
            FlexibleU64::String(n) => n,
        }
    }
}

mod flexible_u64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceMetadata {
    #[serde(rename = "blockHeight")]
    pub block_height: FlexibleU64,
}

/// One raw trace-pipe record as emitted by the node's state-export stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub operation: TraceOperation,
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub metadata: TraceMetadata,
    #[serde(rename = "blockTimeUnixMs")]
    pub block_time_unix_ms: FlexibleU64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub address: String,
    pub code_id: u64,
    pub admin: Option<String>,
    pub creator: Option<String>,
    pub label: Option<String>,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    pub contract_address: String,
    pub key: String,
    pub value: Vec<u8>,
    pub value_json: Option<JsonValue>,
    pub delete: bool,
    pub code_id: CodeId,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchedEvent {
    Contract(ContractEvent),
    State(StateEvent),
}

impl MatchedEvent {
    pub fn block_height(&self) -> u64 {
        match self {
            MatchedEvent::Contract(e) => e.block_height,
            MatchedEvent::State(e) => e.block_height,
        }
    }

    /// In-batch dedup identity: later records with the same id overwrite
    /// earlier ones.
    pub fn event_id(&self) -> String {
        match self {
            MatchedEvent::Contract(e) => format!("contract:{}:{}", e.block_height, e.address),
            MatchedEvent::State(e) => {
                format!("state:{}:{}:{}", e.block_height, e.contract_address, e.key)
            }
        }
    }
}

/// Classifies a single trace record. Returns `Ok(None)` for records that
/// should be silently dropped (wrong prefix, undecodable key, undecodable
/// `ContractInfo`, or a zero/missing code ID at instantiation).
pub fn match_record(
    variant: ChainVariant,
    bech32_prefix: &str,
    record: &TraceRecord,
) -> Result<Option<MatchedEvent>, MatcherError> {
    let key_bytes = BASE64
        .decode(&record.key)
        .map_err(|_| MatcherError::InvalidKeyEncoding)?;
    let value_bytes = if record.value.is_empty() {
        Vec::new()
    } else {
        BASE64
            .decode(&record.value)
            .map_err(|_| MatcherError::InvalidValueEncoding)?
    };

    let decoded = match key_codec::decode_key(variant, &key_bytes) {
        Ok(Some(decoded)) => decoded,
        Ok(None) => return Ok(None),
        Err(err) => {
            debug!(error = %err, "dropping record with malformed key");
            return Ok(None);
        }
    };

    let address = match key_codec::address_to_bech32(&decoded.contract_address_bytes, bech32_prefix)
    {
        Ok(address) => address,
        Err(err) => {
            debug!(error = %err, "dropping record with unencodable address");
            return Ok(None);
        }
    };

    let block_height = record.metadata.block_height.value();
    let block_time_unix_ms = record.block_time_unix_ms.value();

    match (decoded.family, record.operation) {
        (KeyFamily::ContractInfo, TraceOperation::Write) => {
            let Some(info) = decode_contract_info(&value_bytes) else {
                debug!(address = %address, "dropping record with undecodable ContractInfo");
                return Ok(None);
            };
            if info.code_id == 0 {
                debug!(address = %address, "dropping ContractInfo with zero code id");
                return Ok(None);
            }
            Ok(Some(MatchedEvent::Contract(ContractEvent {
                address,
                code_id: info.code_id,
                admin: info.admin,
                creator: info.creator,
                label: info.label,
                block_height,
                block_time_unix_ms,
            })))
        }
        (KeyFamily::ContractInfo, TraceOperation::Delete) => {
            // A delete on a contract-info key has no meaningful lifecycle
            // event to emit; the contract row itself is never removed.
            Ok(None)
        }
        (KeyFamily::ContractState, operation) => {
            let canonical = key_codec::canonical_key(&decoded.user_key_bytes);
            let is_delete = operation == TraceOperation::Delete;

            let (value_string, value_bytes) = match String::from_utf8(value_bytes) {
                Ok(s) => (Some(s), None),
                Err(e) => (None, Some(e.into_bytes())),
            };

            let value_json = if !is_delete {
                value_string
                    .as_deref()
                    .and_then(|s| serde_json::from_str::<JsonValue>(s).ok())
            } else {
                None
            };

            let value = match value_string {
                Some(s) => s.into_bytes(),
                None => value_bytes.unwrap_or_default(),
            };

            Ok(Some(MatchedEvent::State(StateEvent {
                contract_address: address,
                key: canonical,
                value,
                value_json,
                delete: is_delete,
                code_id: CodeId::UNKNOWN,
                block_height,
                block_time_unix_ms,
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_info::{encode_contract_info, ContractInfoDecoded};
    use crate::key_codec::{encode_contract_info_key, encode_contract_state_key};

    fn record(key: Vec<u8>, value: Vec<u8>, op: TraceOperation, height: u64, time: u64) -> TraceRecord {
        TraceRecord {
            operation: op,
            key: BASE64.encode(key),
            value: BASE64.encode(value),
            metadata: TraceMetadata {
                block_height: FlexibleU64::Number(height),
            },
            block_time_unix_ms: FlexibleU64::Number(time),
        }
    }

    #[test]
    fn standard_instantiation_yields_contract_event() {
        let addr = [1u8; 32];
        let key = encode_contract_info_key(ChainVariant::Standard, &addr);
        let info = ContractInfoDecoded {
            code_id: 42,
            creator: Some("c".into()),
            admin: Some("a".into()),
            label: Some("L".into()),
        };
        let value = encode_contract_info(&info);
        let rec = record(key, value, TraceOperation::Write, 100, 1_700_000_000_000);

        let matched = match_record(ChainVariant::Standard, "cosmos", &rec)
            .unwrap()
            .unwrap();
        match matched {
            MatchedEvent::Contract(e) => {
                assert_eq!(e.code_id, 42);
                assert_eq!(e.admin.as_deref(), Some("a"));
                assert_eq!(e.block_height, 100);
            }
            _ => panic!("expected contract event"),
        }
    }

    #[test]
    fn state_write_with_json_value() {
        let addr = [2u8; 32];
        let key = encode_contract_state_key(ChainVariant::Standard, &addr, &[1, 2, 3]);
        let rec = record(
            key,
            br#"{"x":1}"#.to_vec(),
            TraceOperation::Write,
            101,
            1,
        );
        let matched = match_record(ChainVariant::Standard, "cosmos", &rec)
            .unwrap()
            .unwrap();
        match matched {
            MatchedEvent::State(e) => {
                assert_eq!(e.key, "1,2,3");
                assert_eq!(e.value_json, Some(serde_json::json!({"x": 1})));
                assert!(!e.delete);
                assert_eq!(e.code_id, CodeId::UNKNOWN);
            }
            _ => panic!("expected state event"),
        }
    }

    #[test]
    fn delete_has_no_json() {
        let addr = [3u8; 32];
        let key = encode_contract_state_key(ChainVariant::Standard, &addr, &[9]);
        let rec = record(key, Vec::new(), TraceOperation::Delete, 102, 2);
        let matched = match_record(ChainVariant::Standard, "cosmos", &rec)
            .unwrap()
            .unwrap();
        match matched {
            MatchedEvent::State(e) => {
                assert!(e.delete);
                assert_eq!(e.value_json, None);
            }
            _ => panic!("expected state event"),
        }
    }

    #[test]
    fn unrecognized_prefix_drops_record() {
        let rec = record(vec![0xff, 1, 2], vec![], TraceOperation::Write, 1, 1);
        assert!(match_record(ChainVariant::Standard, "cosmos", &rec)
            .unwrap()
            .is_none());
    }

    #[test]
    fn zero_code_id_instantiation_is_dropped() {
        let addr = [4u8; 32];
        let key = encode_contract_info_key(ChainVariant::Standard, &addr);
        let info = ContractInfoDecoded {
            code_id: 0,
            creator: None,
            admin: None,
            label: None,
        };
        let value = encode_contract_info(&info);
        let rec = record(key, value, TraceOperation::Write, 1, 1);
        assert!(match_record(ChainVariant::Standard, "cosmos", &rec)
            .unwrap()
            .is_none());
    }
}

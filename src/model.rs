//! The relational data model every sink reads and writes.
//!
//! `code_id` uses `0` as a sentinel for "unknown" both when a contract has
//! never been resolved and when the resolver has confirmed the contract
//! does not exist on-chain; both cases are retried on a later batch.
//! [`CodeId`] wraps that convention so `0` can never silently leak into a
//! comparison that expects a real, positive code ID.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A CosmWasm code ID, with `0` reserved for "unknown/unresolved".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeId(pub u64);

impl CodeId {
    pub const UNKNOWN: CodeId = CodeId(0);

    pub fn is_known(self) -> bool {
        self.0 > 0
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for CodeId {
    fn from(value: u64) -> Self {
        CodeId(value)
    }
}

/// A block observed in the trace stream.
///
/// Created the first time a trace record reports its height; immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub time_unix_ms: u64,
}

/// Smart contract metadata.
///
/// Created on first observation (lifecycle or state event). Mutated only by
/// a lifecycle event (sets `code_id`, `admin`, `creator`, `label`) or by
/// resolver back-fill (sets `code_id` when it was `0`). Instantiation fields
/// never change after the first insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub address: String,
    pub code_id: CodeId,
    pub admin: Option<String>,
    pub creator: Option<String>,
    pub label: Option<String>,
    pub instantiated_at_block_height: u64,
    pub instantiated_at_block_time_unix_ms: u64,
    pub instantiated_at_block_timestamp: chrono::DateTime<chrono::Utc>,
}

/// A single persisted mutation to a contract's storage.
///
/// Composite unique key: `(block_height, contract_address, key)`. On
/// conflict, `value`/`value_json`/`delete` are overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasmStateEvent {
    pub block_height: u64,
    pub contract_address: String,
    /// Canonical form: comma-joined decimal byte list.
    pub key: String,
    /// Raw value bytes, stored verbatim (may be non-UTF-8).
    pub value: Vec<u8>,
    pub value_json: Option<JsonValue>,
    pub delete: bool,
    /// Denormalized from the owning `Contract` at insert time.
    pub code_id: CodeId,
    pub block_time_unix_ms: u64,
}

/// A derived row produced by a [`crate::transformer::Transformer`].
///
/// Uniqueness: `(contract_address, name, block_height)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasmStateEventTransformation {
    pub contract_address: String,
    pub block_height: u64,
    pub name: String,
    pub value: JsonValue,
}

/// Singleton row tracking the indexer's export progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerState {
    pub chain_id: String,
    pub last_wasm_block_height_exported: u64,
    pub latest_block_height: u64,
    pub latest_block_time_unix_ms: u64,
}

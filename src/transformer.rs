//! Runs registered derivation rules over a batch of parsed state events and
//! persists the rows they produce.
//!
//! Rules are data, not a type hierarchy: a [`Transformer`] is a record of a
//! name, a code-id group, and two closures, held in a flat `Vec` rather than
//! behind a trait-object inheritance chain. This mirrors the registry
//! pattern the teacher uses for its own rule-like structures (the
//! message-handler dispatch in `x/wasm/src/abci_handler.rs`) more than a
//! class hierarchy would.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::db::Database;
use crate::error::TransformerError;
use crate::matcher::StateEvent;
use crate::model::{Contract, WasmStateEventTransformation};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// A single derivation rule: a name, the code ids it applies to, a
/// predicate, and an extractor.
///
/// `code_ids` is already resolved to concrete ids (analogous to the
/// allowlist's resolved rule sets) rather than held as symbolic names,
/// since resolving a symbolic code-key group to ids is an external-registry
/// concern this crate does not own.
pub struct Transformer {
    pub name: String,
    pub code_ids: HashSet<u64>,
    pub matches: Arc<dyn Fn(&str, Option<&JsonValue>) -> bool + Send + Sync>,
    pub extract: Arc<dyn Fn(&StateEvent) -> JsonValue + Send + Sync>,
}

impl Transformer {
    fn applies_to(&self, code_id: u64) -> bool {
        self.code_ids.contains(&code_id)
    }
}

/// Holds the registered rules and runs them against a batch.
pub struct TransformerEngine {
    db: Arc<dyn Database>,
    rules: Vec<Transformer>,
}

impl TransformerEngine {
    pub fn new(db: Arc<dyn Database>, rules: Vec<Transformer>) -> Self {
        Self { db, rules }
    }

    /// Evaluates every registered rule against `events`, persists the
    /// resulting rows (upsert on `(contract_address, name, block_height)`),
    /// and joins each transformation to its contract identically to the
    /// event sink, dropping transformations for contracts absent from
    /// `contracts`.
    pub async fn run(
        &self,
        events: &[StateEvent],
        contracts: &HashMap<String, Contract>,
    ) -> Result<Vec<WasmStateEventTransformation>, TransformerError> {
        let mut produced = Vec::new();
        for event in events {
            if !contracts.contains_key(&event.contract_address) {
                continue;
            }
            for rule in &self.rules {
                if !rule.applies_to(event.code_id.as_u64()) {
                    continue;
                }
                if !(rule.matches)(&event.key, event.value_json.as_ref()) {
                    continue;
                }
                let value = (rule.extract)(event);
                produced.push(WasmStateEventTransformation {
                    contract_address: event.contract_address.clone(),
                    block_height: event.block_height,
                    name: rule.name.clone(),
                    value,
                });
            }
        }

        self.persist_with_retry(&produced).await?;
        Ok(produced)
    }

    async fn persist_with_retry(
        &self,
        rows: &[WasmStateEventTransformation],
    ) -> Result<(), TransformerError> {
        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.db.upsert_transformations(rows).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, error = %err, "transformer persistence failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err.into()),
            }
        }
        unreachable!("loop always returns by the last attempt")
    }
}

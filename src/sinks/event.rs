//! Persists state events with dedup-on-merge semantics and drops any event
//! whose contract turned out not to exist.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Database;
use crate::error::SinkError;
use crate::matcher::StateEvent;
use crate::model::Contract;

pub struct EventSink {
    db: Arc<dyn Database>,
}

impl EventSink {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Inserts every event, overwriting `value`/`value_json`/`delete` on a
    /// `(block_height, contract_address, key)` conflict.
    pub async fn upsert_events(&self, events: &[StateEvent]) -> Result<(), SinkError> {
        self.db.upsert_state_events(events).await
    }

    /// Joins each event to its Contract from the already-fetched `contracts`
    /// map, dropping (and logging) any event whose contract is still absent.
    pub fn join_and_drop_missing_contracts(
        events: Vec<StateEvent>,
        contracts: &HashMap<String, Contract>,
    ) -> Vec<StateEvent> {
        events
            .into_iter()
            .filter(|event| {
                let present = contracts.contains_key(&event.contract_address);
                if !present {
                    tracing::warn!(
                        address = %event.contract_address,
                        "contract disappeared between insert and re-read, dropping event"
                    );
                }
                present
            })
            .collect()
    }
}

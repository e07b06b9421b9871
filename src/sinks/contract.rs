//! Upserts contract metadata and guarantees a `Contract` row exists before
//! any state event referencing it is persisted.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::db::Database;
use crate::error::SinkError;
use crate::matcher::{ContractEvent, StateEvent};
use crate::model::{CodeId, Contract};
use crate::resolver::Resolver;

const BACKFILL_CONCURRENCY: usize = 8;

pub struct ContractSink {
    db: Arc<dyn Database>,
}

impl ContractSink {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Inserts or updates a contract from a lifecycle event. Instantiation
    /// fields are only ever written on the initial insert.
    pub async fn upsert_from_lifecycle_events(
        &self,
        events: &[ContractEvent],
    ) -> Result<(), SinkError> {
        self.db.upsert_contracts_from_lifecycle(events).await
    }

    /// Existence back-fill from state events. Groups by address and inserts
    /// a placeholder row (code id unknown) using the earliest event in the
    /// batch for that address; does nothing if the address already has a
    /// row.
    pub async fn backfill_from_state_events(&self, events: &[StateEvent]) -> Result<(), SinkError> {
        self.db.backfill_contracts_from_state_events(events).await
    }

    /// Re-reads every contract row for the given addresses.
    pub async fn fetch_contracts(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, Contract>, SinkError> {
        self.db.fetch_contracts(addresses).await
    }

    /// Resolves a code id for every contract still unknown, in parallel with
    /// bounded concurrency, and updates only the `code_id` column for those
    /// that resolved to a known value.
    pub async fn backfill_code_ids(
        &self,
        resolver: &Arc<Resolver>,
        contracts: &[Contract],
    ) -> Result<(), SinkError> {
        let unresolved: Vec<&Contract> = contracts
            .iter()
            .filter(|contract| !contract.code_id.is_known())
            .collect();
        if unresolved.is_empty() {
            return Ok(());
        }

        let resolved: Vec<(String, CodeId)> = stream::iter(unresolved)
            .map(|contract| {
                let resolver = Arc::clone(resolver);
                let address = contract.address.clone();
                async move {
                    let code_id = resolver.resolve(&address).await;
                    (address, code_id)
                }
            })
            .buffer_unordered(BACKFILL_CONCURRENCY)
            .collect()
            .await;

        for (address, code_id) in resolved {
            if !code_id.is_known() {
                continue;
            }
            self.db.update_contract_code_id(&address, code_id.as_u64()).await?;
        }
        Ok(())
    }
}

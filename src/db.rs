//! Persistence boundary every sink and the watermark manager call through.
//!
//! [`Database`] is a plain async trait, the same way [`crate::resolver::CodeIdRpc`]
//! hides the concrete RPC transport behind a trait so the retry/cache logic
//! above it can be exercised without a live endpoint. [`PgDatabase`] is the
//! real Postgres-backed implementation; an in-memory fake lives under
//! `test_support` so the sinks, the watermark manager and the processor can
//! all be driven by ordinary `#[tokio::test]` functions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::SinkError;
use crate::matcher::{ContractEvent, StateEvent};
use crate::model::{Block, CodeId, Contract, IndexerState, WasmStateEventTransformation};

#[async_trait]
pub trait Database: Send + Sync {
    async fn upsert_blocks(&self, blocks: &[Block]) -> Result<(), SinkError>;

    async fn upsert_contracts_from_lifecycle(
        &self,
        events: &[ContractEvent],
    ) -> Result<(), SinkError>;

    async fn backfill_contracts_from_state_events(
        &self,
        events: &[StateEvent],
    ) -> Result<(), SinkError>;

    async fn fetch_contracts(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, Contract>, SinkError>;

    async fn update_contract_code_id(&self, address: &str, code_id: u64) -> Result<(), SinkError>;

    async fn upsert_state_events(&self, events: &[StateEvent]) -> Result<(), SinkError>;

    async fn upsert_transformations(
        &self,
        rows: &[WasmStateEventTransformation],
    ) -> Result<(), SinkError>;

    async fn fetch_indexer_state(&self, chain_id: &str) -> Result<Option<IndexerState>, SinkError>;

    async fn advance_watermark(
        &self,
        chain_id: &str,
        batch_max_height: u64,
        batch_max_time_unix_ms: u64,
    ) -> Result<(), SinkError>;
}

/// Groups state events by contract address and keeps, for each address,
/// whichever event has the lowest block height. Shared by every
/// `Database` implementation's state-event backfill path so the "earliest
/// event wins" rule only has to be written once.
fn earliest_by_address(events: &[StateEvent]) -> HashMap<&str, &StateEvent> {
    let mut earliest: HashMap<&str, &StateEvent> = HashMap::new();
    for event in events {
        earliest
            .entry(event.contract_address.as_str())
            .and_modify(|current| {
                if event.block_height < current.block_height {
                    *current = event;
                }
            })
            .or_insert(event);
    }
    earliest
}

/// Postgres-backed `Database`, one method per table operation, mirroring a
/// thin database wrapper around a connection pool rather than a single
/// god object per query. Uses the runtime `sqlx::query`/`query_as` forms
/// instead of the compile-time `query!` macros, since those need either a
/// live database connection or a committed query-cache file at build time.
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ContractRow {
    address: String,
    code_id: i64,
    admin: Option<String>,
    creator: Option<String>,
    label: Option<String>,
    instantiated_at_block_height: i64,
    instantiated_at_block_time_unix_ms: i64,
    instantiated_at_block_timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<ContractRow> for Contract {
    fn from(row: ContractRow) -> Self {
        Contract {
            address: row.address,
            code_id: CodeId(row.code_id.max(0) as u64),
            admin: row.admin,
            creator: row.creator,
            label: row.label,
            instantiated_at_block_height: row.instantiated_at_block_height.max(0) as u64,
            instantiated_at_block_time_unix_ms: row.instantiated_at_block_time_unix_ms.max(0) as u64,
            instantiated_at_block_timestamp: row.instantiated_at_block_timestamp,
        }
    }
}

#[derive(FromRow)]
struct IndexerStateRow {
    chain_id: String,
    last_wasm_block_height_exported: i64,
    latest_block_height: i64,
    latest_block_time_unix_ms: i64,
}

impl From<IndexerStateRow> for IndexerState {
    fn from(row: IndexerStateRow) -> Self {
        IndexerState {
            chain_id: row.chain_id,
            last_wasm_block_height_exported: row.last_wasm_block_height_exported.max(0) as u64,
            latest_block_height: row.latest_block_height.max(0) as u64,
            latest_block_time_unix_ms: row.latest_block_time_unix_ms.max(0) as u64,
        }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn upsert_blocks(&self, blocks: &[Block]) -> Result<(), SinkError> {
        for block in blocks {
            sqlx::query(
                "INSERT INTO blocks (height, time_unix_ms) VALUES ($1, $2)
                 ON CONFLICT (height) DO NOTHING",
            )
            .bind(block.height as i64)
            .bind(block.time_unix_ms as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn upsert_contracts_from_lifecycle(
        &self,
        events: &[ContractEvent],
    ) -> Result<(), SinkError> {
        for event in events {
            let timestamp = Utc
                .timestamp_millis_opt(event.block_time_unix_ms as i64)
                .single()
                .unwrap_or_else(Utc::now);
            sqlx::query(
                "INSERT INTO contracts
                    (address, code_id, admin, creator, label,
                     instantiated_at_block_height, instantiated_at_block_time_unix_ms,
                     instantiated_at_block_timestamp)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (address) DO UPDATE SET
                    code_id = EXCLUDED.code_id,
                    admin = EXCLUDED.admin,
                    creator = EXCLUDED.creator,
                    label = EXCLUDED.label",
            )
            .bind(&event.address)
            .bind(event.code_id as i64)
            .bind(&event.admin)
            .bind(&event.creator)
            .bind(&event.label)
            .bind(event.block_height as i64)
            .bind(event.block_time_unix_ms as i64)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn backfill_contracts_from_state_events(
        &self,
        events: &[StateEvent],
    ) -> Result<(), SinkError> {
        for event in earliest_by_address(events).into_values() {
            let timestamp = Utc
                .timestamp_millis_opt(event.block_time_unix_ms as i64)
                .single()
                .unwrap_or_else(Utc::now);
            sqlx::query(
                "INSERT INTO contracts
                    (address, code_id, instantiated_at_block_height,
                     instantiated_at_block_time_unix_ms, instantiated_at_block_timestamp)
                 VALUES ($1, 0, $2, $3, $4)
                 ON CONFLICT (address) DO NOTHING",
            )
            .bind(&event.contract_address)
            .bind(event.block_height as i64)
            .bind(event.block_time_unix_ms as i64)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn fetch_contracts(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, Contract>, SinkError> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<ContractRow> = sqlx::query_as(
            "SELECT address, code_id, admin, creator, label,
                    instantiated_at_block_height, instantiated_at_block_time_unix_ms,
                    instantiated_at_block_timestamp
             FROM contracts WHERE address = ANY($1)",
        )
        .bind(addresses)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(Contract::from)
            .map(|contract| (contract.address.clone(), contract))
            .collect())
    }

    async fn update_contract_code_id(&self, address: &str, code_id: u64) -> Result<(), SinkError> {
        sqlx::query("UPDATE contracts SET code_id = $1 WHERE address = $2")
            .bind(code_id as i64)
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_state_events(&self, events: &[StateEvent]) -> Result<(), SinkError> {
        for event in events {
            sqlx::query(
                "INSERT INTO wasm_state_events
                    (block_height, contract_address, key, value, value_json, delete, code_id, block_time_unix_ms)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (block_height, contract_address, key) DO UPDATE SET
                    value = EXCLUDED.value,
                    value_json = EXCLUDED.value_json,
                    delete = EXCLUDED.delete",
            )
            .bind(event.block_height as i64)
            .bind(&event.contract_address)
            .bind(&event.key)
            .bind(&event.value)
            .bind(&event.value_json)
            .bind(event.delete)
            .bind(event.code_id.as_u64() as i64)
            .bind(event.block_time_unix_ms as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn upsert_transformations(
        &self,
        rows: &[WasmStateEventTransformation],
    ) -> Result<(), SinkError> {
        for row in rows {
            sqlx::query(
                "INSERT INTO wasm_state_event_transformations
                    (contract_address, block_height, name, value)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (contract_address, name, block_height) DO UPDATE SET
                    value = EXCLUDED.value",
            )
            .bind(&row.contract_address)
            .bind(row.block_height as i64)
            .bind(&row.name)
            .bind(&row.value)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn fetch_indexer_state(&self, chain_id: &str) -> Result<Option<IndexerState>, SinkError> {
        let row: Option<IndexerStateRow> = sqlx::query_as(
            "SELECT chain_id, last_wasm_block_height_exported, latest_block_height, latest_block_time_unix_ms
             FROM indexer_state WHERE chain_id = $1",
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(IndexerState::from))
    }

    async fn advance_watermark(
        &self,
        chain_id: &str,
        batch_max_height: u64,
        batch_max_time_unix_ms: u64,
    ) -> Result<(), SinkError> {
        sqlx::query(
            "INSERT INTO indexer_state
                (chain_id, last_wasm_block_height_exported, latest_block_height, latest_block_time_unix_ms)
             VALUES ($1, $2, $2, $3)
             ON CONFLICT (chain_id) DO UPDATE SET
                last_wasm_block_height_exported =
                    GREATEST(indexer_state.last_wasm_block_height_exported, EXCLUDED.last_wasm_block_height_exported),
                latest_block_height =
                    GREATEST(indexer_state.latest_block_height, EXCLUDED.latest_block_height),
                latest_block_time_unix_ms =
                    GREATEST(indexer_state.latest_block_time_unix_ms, EXCLUDED.latest_block_time_unix_ms)",
        )
        .bind(chain_id)
        .bind(batch_max_height as i64)
        .bind(batch_max_time_unix_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

//! The batch orchestrator: wires the Matcher, Allowlist, sinks, Transformer
//! Engine, Watermark Manager and enqueue boundary together into a single
//! `process_batch` call.
//!
//! Each step runs in the fixed order below; a batch-fatal error anywhere
//! before the watermark advance aborts the whole batch, leaving the
//! watermark untouched so the caller can retry the identical input.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::error::ProcessorError;
use crate::key_codec::ChainVariant;
use crate::matcher::{self, MatchedEvent, StateEvent, TraceRecord};
use crate::model::Contract;
use crate::queue::{JobQueue, WasmCodeTrackerJob};
use crate::resolver::Resolver;
use crate::sinks::{BlockSink, ContractSink, EventSink};
use crate::transformer::{Transformer, TransformerEngine};
use crate::watermark::WatermarkManager;

/// Summary of one successfully processed batch, returned for logging/metrics
/// at the call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub blocks_touched: usize,
    pub contract_events_seen: usize,
    pub state_events_persisted: usize,
    pub transformations_persisted: usize,
    pub watermark_advanced_to: Option<u64>,
}

pub struct Processor {
    db: Arc<dyn Database>,
    config: Config,
    chain_variant: ChainVariant,
    resolver: Arc<Resolver>,
    allowlist: crate::allowlist::Allowlist,
    transformer_engine: TransformerEngine,
    job_queue: Arc<dyn JobQueue>,
    cancellation: CancellationToken,
}

impl Processor {
    /// Builds the allowlist from `config.state_event_allowlist` and the
    /// transformer engine from `transformer_rules`; both live inside the
    /// processor rather than being threaded in pre-built.
    pub fn new(
        db: Arc<dyn Database>,
        config: Config,
        chain_variant: ChainVariant,
        resolver: Arc<Resolver>,
        transformer_rules: Vec<Transformer>,
        job_queue: Arc<dyn JobQueue>,
        cancellation: CancellationToken,
    ) -> Result<Self, ProcessorError> {
        let allowlist = config.build_allowlist()?;
        let transformer_engine = TransformerEngine::new(db.clone(), transformer_rules);
        Ok(Self {
            db,
            config,
            chain_variant,
            resolver,
            allowlist,
            transformer_engine,
            job_queue,
            cancellation,
        })
    }

    fn check_cancelled(&self) -> Result<(), ProcessorError> {
        if self.cancellation.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        Ok(())
    }

    pub async fn process_batch(
        &self,
        records: &[TraceRecord],
    ) -> Result<BatchReport, ProcessorError> {
        self.check_cancelled()?;

        let watermark = WatermarkManager::new(self.db.clone());
        let chain_id = self
            .config
            .chain_id
            .clone()
            .ok_or(ProcessorError::MissingChainId)?;
        let existing_state = watermark
            .fetch(&chain_id)
            .await?
            .ok_or(ProcessorError::MissingIndexerState)?;

        // Match every record and collapse same-ID duplicates within the
        // batch, keeping the last write.
        let mut by_id: HashMap<String, MatchedEvent> = HashMap::new();
        for record in records {
            match matcher::match_record(self.chain_variant, &self.config.bech32_prefix, record) {
                Ok(Some(event)) => {
                    by_id.insert(event.event_id(), event);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(error = %err, "dropping malformed trace record");
                }
            }
        }
        let events: Vec<MatchedEvent> = by_id.into_values().collect();

        let mut contract_events = Vec::new();
        let mut state_events = Vec::new();
        for event in events.iter().cloned() {
            match event {
                MatchedEvent::Contract(e) => contract_events.push(e),
                MatchedEvent::State(e) => state_events.push(e),
            }
        }

        self.check_cancelled()?;

        let blocks = BlockSink::distinct_blocks(&events);
        let block_sink = BlockSink::new(self.db.clone());
        block_sink.upsert_blocks(&blocks).await?;

        let contract_sink = ContractSink::new(self.db.clone());
        contract_sink
            .upsert_from_lifecycle_events(&contract_events)
            .await?;
        contract_sink
            .backfill_from_state_events(&state_events)
            .await?;

        self.check_cancelled()?;

        let mut addresses: HashSet<String> = contract_events.iter().map(|e| e.address.clone()).collect();
        addresses.extend(state_events.iter().map(|e| e.contract_address.clone()));
        let addresses: Vec<String> = addresses.into_iter().collect();

        let mut contracts = contract_sink.fetch_contracts(&addresses).await?;

        // Resolve any contract whose code ID is still unknown, then re-read
        // so the rest of the batch sees the resolved value.
        let unresolved: Vec<Contract> = contracts.values().cloned().collect();
        contract_sink
            .backfill_code_ids(&self.resolver, &unresolved)
            .await?;
        contracts = contract_sink.fetch_contracts(&addresses).await?;

        self.check_cancelled()?;

        // Denormalize the now-resolved code IDs onto state events before
        // applying the allowlist, since allowlist rules key off code ID.
        let mut resolved_state_events: Vec<StateEvent> = state_events
            .into_iter()
            .map(|mut event| {
                if let Some(contract) = contracts.get(&event.contract_address) {
                    event.code_id = contract.code_id;
                }
                event
            })
            .collect();
        resolved_state_events.retain(|event| {
            self.allowlist
                .is_allowed(&chain_id, event.code_id, &event.key)
        });

        let event_sink = EventSink::new(self.db.clone());
        event_sink.upsert_events(&resolved_state_events).await?;
        let persisted_state_events =
            EventSink::join_and_drop_missing_contracts(resolved_state_events, &contracts);

        self.check_cancelled()?;

        let transformations = self
            .transformer_engine
            .run(&persisted_state_events, &contracts)
            .await?;

        // Webhook enqueue happens strictly before the watermark advances, so
        // a delivery failure can still be retried against the same batch.
        if self.config.send_webhooks {
            let deliverable: Vec<_> = persisted_state_events
                .iter()
                .filter(|event| {
                    event.block_height >= existing_state.last_wasm_block_height_exported
                })
                .map(|event| crate::model::WasmStateEvent {
                    block_height: event.block_height,
                    contract_address: event.contract_address.clone(),
                    key: event.key.clone(),
                    value: event.value.clone(),
                    value_json: event.value_json.clone(),
                    delete: event.delete,
                    code_id: event.code_id,
                    block_time_unix_ms: event.block_time_unix_ms,
                })
                .collect();
            if !deliverable.is_empty() {
                self.job_queue.enqueue_webhook_events(&deliverable).await?;
            }
        }

        // Wasm-code-tracker enqueue, keyed by the first contract event's
        // block height so repeated delivery of the same batch is idempotent.
        if let Some(first) = contract_events.first() {
            self.job_queue
                .enqueue_wasm_code_tracker_job(WasmCodeTrackerJob {
                    block_height: first.block_height,
                    contract_events: contract_events.clone(),
                    state_event_updates: persisted_state_events.clone(),
                })
                .await?;
        }

        self.check_cancelled()?;

        // Watermark advance happens exactly once, after persistence succeeds.
        let batch_max = events
            .iter()
            .map(|event| (event.block_height(), event_time(event)))
            .max_by_key(|(height, _)| *height);

        let watermark_advanced_to = if let Some((max_height, max_time)) = batch_max {
            watermark.advance(&chain_id, max_height, max_time).await?;
            info!(chain_id = %chain_id, height = max_height, "watermark advanced");
            Some(max_height)
        } else {
            None
        };

        Ok(BatchReport {
            blocks_touched: blocks.len(),
            contract_events_seen: contract_events.len(),
            state_events_persisted: persisted_state_events.len(),
            transformations_persisted: transformations.len(),
            watermark_advanced_to,
        })
    }
}

fn event_time(event: &MatchedEvent) -> u64 {
    match event {
        MatchedEvent::Contract(e) => e.block_time_unix_ms,
        MatchedEvent::State(e) => e.block_time_unix_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllowlistRuleConfig;
    use crate::db::test_support::InMemoryDatabase;
    use crate::error::ResolverError;
    use crate::matcher::{FlexibleU64, TraceOperation};
    use crate::queue::test_support::RecordingJobQueue;
    use crate::resolver::CodeIdRpc;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    struct StaticRpc(HashMap<String, u64>);

    #[async_trait]
    impl CodeIdRpc for StaticRpc {
        async fn fetch_code_id(&self, address: &str) -> Result<Option<u64>, ResolverError> {
            Ok(self.0.get(address).copied())
        }
    }

    fn config(chain_id: &str) -> Config {
        Config {
            bech32_prefix: "cosmos".to_string(),
            chain_id: Some(chain_id.to_string()),
            rpc_endpoint: "http://localhost".to_string(),
            send_webhooks: false,
            state_event_allowlist: HashMap::new(),
        }
    }

    fn instantiation_record(addr: [u8; 32], code_id: u64, height: u64, time: u64) -> TraceRecord {
        let key = crate::key_codec::encode_contract_info_key(ChainVariant::Standard, &addr);
        let info = crate::contract_info::ContractInfoDecoded {
            code_id,
            creator: Some("creator".to_string()),
            admin: None,
            label: Some("label".to_string()),
        };
        let value = crate::contract_info::encode_contract_info(&info);
        TraceRecord {
            operation: TraceOperation::Write,
            key: BASE64.encode(key),
            value: BASE64.encode(value),
            metadata: crate::matcher::TraceMetadata {
                block_height: FlexibleU64::Number(height),
            },
            block_time_unix_ms: FlexibleU64::Number(time),
        }
    }

    fn state_write_record(
        addr: [u8; 32],
        user_key: &[u8],
        value: &[u8],
        height: u64,
        time: u64,
    ) -> TraceRecord {
        let key = crate::key_codec::encode_contract_state_key(ChainVariant::Standard, &addr, user_key);
        TraceRecord {
            operation: TraceOperation::Write,
            key: BASE64.encode(key),
            value: BASE64.encode(value),
            metadata: crate::matcher::TraceMetadata {
                block_height: FlexibleU64::Number(height),
            },
            block_time_unix_ms: FlexibleU64::Number(time),
        }
    }

    fn state_delete_record(addr: [u8; 32], user_key: &[u8], height: u64, time: u64) -> TraceRecord {
        let key = crate::key_codec::encode_contract_state_key(ChainVariant::Standard, &addr, user_key);
        TraceRecord {
            operation: TraceOperation::Delete,
            key: BASE64.encode(key),
            value: String::new(),
            metadata: crate::matcher::TraceMetadata {
                block_height: FlexibleU64::Number(height),
            },
            block_time_unix_ms: FlexibleU64::Number(time),
        }
    }

    async fn seeded_processor(chain_id: &str) -> (Processor, Arc<InMemoryDatabase>) {
        let db = Arc::new(InMemoryDatabase::seeded(chain_id).await);
        let resolver = Arc::new(Resolver::new(Arc::new(StaticRpc(HashMap::new()))));
        let processor = Processor::new(
            db.clone(),
            config(chain_id),
            ChainVariant::Standard,
            resolver,
            Vec::new(),
            Arc::new(RecordingJobQueue::default()),
            CancellationToken::new(),
        )
        .unwrap();
        (processor, db)
    }

    #[tokio::test]
    async fn instantiation_persists_contract_and_block() {
        let (processor, db) = seeded_processor("osmosis-1").await;
        let addr = [1u8; 32];
        let records = vec![instantiation_record(addr, 42, 100, 1_000)];

        let report = processor.process_batch(&records).await.unwrap();
        assert_eq!(report.contract_events_seen, 1);
        assert_eq!(report.blocks_touched, 1);
        assert_eq!(report.watermark_advanced_to, Some(100));

        let address = crate::key_codec::address_to_bech32(&addr, "cosmos").unwrap();
        let contract = db.contract(&address).await.unwrap();
        assert_eq!(contract.code_id, crate::model::CodeId(42));
        assert!(db.block(100).await.is_some());
    }

    #[tokio::test]
    async fn state_write_backfills_code_id_through_resolver() {
        let addr = [2u8; 32];
        let address = crate::key_codec::address_to_bech32(&addr, "cosmos").unwrap();
        let db = Arc::new(InMemoryDatabase::seeded("osmosis-1").await);
        let mut rpc_table = HashMap::new();
        rpc_table.insert(address.clone(), 77u64);
        let resolver = Arc::new(Resolver::new(Arc::new(StaticRpc(rpc_table))));
        let processor = Processor::new(
            db.clone(),
            config("osmosis-1"),
            ChainVariant::Standard,
            resolver,
            Vec::new(),
            Arc::new(RecordingJobQueue::default()),
            CancellationToken::new(),
        )
        .unwrap();

        let records = vec![state_write_record(addr, &[1, 2], br#"{"n":1}"#, 50, 5)];
        let report = processor.process_batch(&records).await.unwrap();
        assert_eq!(report.state_events_persisted, 1);

        let contract = db.contract(&address).await.unwrap();
        assert_eq!(contract.code_id, crate::model::CodeId(77));
    }

    #[tokio::test]
    async fn allowlist_restricts_persisted_keys_for_matching_code_id() {
        let addr = [3u8; 32];
        let address = crate::key_codec::address_to_bech32(&addr, "cosmos").unwrap();
        let db = Arc::new(InMemoryDatabase::seeded("osmosis-1").await);
        let mut rpc_table = HashMap::new();
        rpc_table.insert(address.clone(), 9u64);
        let resolver = Arc::new(Resolver::new(Arc::new(StaticRpc(rpc_table))));

        let mut cfg = config("osmosis-1");
        cfg.state_event_allowlist.insert(
            "osmosis-1".to_string(),
            vec![AllowlistRuleConfig {
                code_ids_keys: vec!["9".to_string()],
                state_keys: vec!["1,2".to_string()],
            }],
        );
        let processor = Processor::new(
            db.clone(),
            cfg,
            ChainVariant::Standard,
            resolver,
            Vec::new(),
            Arc::new(RecordingJobQueue::default()),
            CancellationToken::new(),
        )
        .unwrap();

        let records = vec![
            state_write_record(addr, &[1, 2], b"{}", 60, 6),
            state_write_record(addr, &[9, 9], b"{}", 60, 6),
        ];
        let report = processor.process_batch(&records).await.unwrap();
        assert_eq!(report.state_events_persisted, 1);
        assert_eq!(db.state_event_count().await, 1);
    }

    #[tokio::test]
    async fn reprocessing_the_same_batch_is_idempotent() {
        let (processor, db) = seeded_processor("osmosis-1").await;
        let addr = [4u8; 32];
        let records = vec![
            instantiation_record(addr, 42, 200, 10),
            state_write_record(addr, &[5], b"{}", 200, 10),
        ];

        processor.process_batch(&records).await.unwrap();
        let first_count = db.state_event_count().await;
        processor.process_batch(&records).await.unwrap();
        let second_count = db.state_event_count().await;

        assert_eq!(first_count, second_count);
        assert_eq!(db.indexer_state("osmosis-1").await.unwrap().last_wasm_block_height_exported, 200);
    }

    #[tokio::test]
    async fn write_then_delete_in_the_same_block_keeps_only_the_delete() {
        let (processor, db) = seeded_processor("osmosis-1").await;
        let addr = [5u8; 32];
        let write = state_write_record(addr, &[1], b"{}", 300, 1);
        let delete = state_delete_record(addr, &[1], 300, 2);

        let report = processor.process_batch(&[write, delete]).await.unwrap();
        assert_eq!(report.state_events_persisted, 1);

        let address = crate::key_codec::address_to_bech32(&addr, "cosmos").unwrap();
        let event = db.state_event(300, &address, "1").await.unwrap();
        assert!(event.delete);
    }

    #[tokio::test]
    async fn missing_indexer_state_fails_before_touching_the_database() {
        let db = Arc::new(InMemoryDatabase::new());
        let resolver = Arc::new(Resolver::new(Arc::new(StaticRpc(HashMap::new()))));
        let processor = Processor::new(
            db,
            config("osmosis-1"),
            ChainVariant::Standard,
            resolver,
            Vec::new(),
            Arc::new(RecordingJobQueue::default()),
            CancellationToken::new(),
        )
        .unwrap();

        let addr = [6u8; 32];
        let err = processor
            .process_batch(&[instantiation_record(addr, 1, 1, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::MissingIndexerState));
    }
}

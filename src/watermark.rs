//! Advances the singleton `IndexerState` row with MAX semantics, exactly
//! once per successful batch.

use std::sync::Arc;

use crate::db::Database;
use crate::error::SinkError;
use crate::model::IndexerState;

pub struct WatermarkManager {
    db: Arc<dyn Database>,
}

impl WatermarkManager {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn fetch(&self, chain_id: &str) -> Result<Option<IndexerState>, SinkError> {
        self.db.fetch_indexer_state(chain_id).await
    }

    /// Advances `last_wasm_block_height_exported`, `latest_block_height` and
    /// `latest_block_time_unix_ms` to `max(existing, batch_max_*)`. Taken
    /// from the event in the batch with the highest block height.
    pub async fn advance(
        &self,
        chain_id: &str,
        batch_max_height: u64,
        batch_max_time_unix_ms: u64,
    ) -> Result<(), SinkError> {
        self.db
            .advance_watermark(chain_id, batch_max_height, batch_max_time_unix_ms)
            .await
    }
}

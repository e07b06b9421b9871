//! One row per distinct block height observed in a batch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Database;
use crate::error::SinkError;
use crate::matcher::MatchedEvent;
use crate::model::Block;

pub struct BlockSink {
    db: Arc<dyn Database>,
}

impl BlockSink {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Collapses a batch of matched events to one `Block` per height, using
    /// the first event seen for each height for its `block_time_unix_ms`.
    pub fn distinct_blocks(events: &[MatchedEvent]) -> Vec<Block> {
        let mut seen = HashMap::new();
        let mut order = Vec::new();
        for event in events {
            seen.entry(event.block_height()).or_insert_with(|| {
                order.push(event.block_height());
                Block {
                    height: event.block_height(),
                    time_unix_ms: match event {
                        MatchedEvent::Contract(e) => e.block_time_unix_ms,
                        MatchedEvent::State(e) => e.block_time_unix_ms,
                    },
                }
            });
        }
        order.into_iter().map(|height| seen[&height].clone()).collect()
    }

    /// Existing rows are never overwritten: a height observed twice keeps
    /// whichever `time_unix_ms` was recorded first.
    pub async fn upsert_blocks(&self, blocks: &[Block]) -> Result<(), SinkError> {
        self.db.upsert_blocks(blocks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::InMemoryDatabase;
    use crate::matcher::StateEvent;
    use crate::model::CodeId;

    fn state_event(height: u64, time: u64) -> MatchedEvent {
        MatchedEvent::State(StateEvent {
            contract_address: "addr1".to_string(),
            key: "1".to_string(),
            value: Vec::new(),
            value_json: None,
            delete: false,
            code_id: CodeId::UNKNOWN,
            block_height: height,
            block_time_unix_ms: time,
        })
    }

    #[test]
    fn distinct_blocks_keeps_first_time_seen_per_height() {
        let events = vec![state_event(10, 100), state_event(10, 999), state_event(11, 200)];
        let blocks = BlockSink::distinct_blocks(&events);
        assert_eq!(blocks.len(), 2);
        let block_10 = blocks.iter().find(|b| b.height == 10).unwrap();
        assert_eq!(block_10.time_unix_ms, 100);
    }

    #[tokio::test]
    async fn existing_block_row_keeps_its_original_time() {
        let db = Arc::new(InMemoryDatabase::new());
        let sink = BlockSink::new(db.clone());

        sink.upsert_blocks(&[Block { height: 10, time_unix_ms: 100 }])
            .await
            .unwrap();
        sink.upsert_blocks(&[Block { height: 10, time_unix_ms: 999 }])
            .await
            .unwrap();

        let stored = db.block(10).await.unwrap();
        assert_eq!(stored.time_unix_ms, 100);
    }
}

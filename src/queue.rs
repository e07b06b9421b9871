//! Webhook and wasm-code-tracker enqueue boundary.
//!
//! Delivery and the queue backend itself are external collaborators out of
//! scope here; only the enqueue contract is modeled, as a trait the
//! Processor depends on. This mirrors the decoupling the teacher gives
//! `WasmEngine`/`Keeper`, so the VM backend can be swapped without touching
//! keeper logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::matcher::{ContractEvent, StateEvent};
use crate::model::WasmStateEvent;

/// Keyed by the batch's first contract event's block height; enqueue is
/// idempotent on that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasmCodeTrackerJob {
    pub block_height: u64,
    pub contract_events: Vec<ContractEvent>,
    pub state_event_updates: Vec<StateEvent>,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Fire-and-forget with a bounded synchronous wait; the core never
    /// delivers webhooks itself.
    async fn enqueue_webhook_events(&self, events: &[WasmStateEvent]) -> Result<(), QueueError>;

    async fn enqueue_wasm_code_tracker_job(&self, job: WasmCodeTrackerJob) -> Result<(), QueueError>;
}

/// No-op queue used where webhook delivery is disabled, or in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJobQueue;

#[async_trait]
impl JobQueue for NullJobQueue {
    async fn enqueue_webhook_events(&self, _events: &[WasmStateEvent]) -> Result<(), QueueError> {
        Ok(())
    }

    async fn enqueue_wasm_code_tracker_job(&self, _job: WasmCodeTrackerJob) -> Result<(), QueueError> {
        Ok(())
    }
}

//! Wasm export pipeline for a Cosmos-SDK chain running the CosmWasm module.
//!
//! This crate ingests a stream of raw key/value store mutations emitted by a
//! full node's trace pipe, reconstructs the logical history of every smart
//! contract's storage, and persists that history so that downstream queries
//! can answer point-in-time and historical questions about any contract's
//! state. The entry point is [`processor::Processor`]; everything else in
//! this crate is a leaf component it wires together.
//!
//! The pipeline, leaves first:
//! - [`key_codec`] parses and builds the chain's CosmWasm store key layout.
//! - [`contract_info`] decodes the `ContractInfo` protobuf payload.
//! - [`resolver`] maps a contract address to its code ID via RPC, cached.
//! - [`allowlist`] restricts which state keys are persisted per code ID.
//! - [`matcher`] classifies one raw trace record into a typed event.
//! - [`model`] is the relational data model events and contracts map onto.
//! - [`db`] is the persistence trait the sinks and watermark manager call
//!   through, with a Postgres implementation and an in-memory test double.
//! - [`sinks`] persist blocks, contracts and state events.
//! - [`transformer`] derives normalized rows from persisted state events.
//! - [`watermark`] advances the indexer's monotonic export pointer.
//! - [`queue`] is the enqueue boundary to webhook delivery and code tracking.
//! - [`processor`] orchestrates all of the above per batch.

pub mod allowlist;
pub mod config;
pub mod contract_info;
pub mod db;
pub mod error;
pub mod key_codec;
pub mod matcher;
pub mod model;
pub mod processor;
pub mod queue;
pub mod resolver;
pub mod schema;
pub mod sinks;
pub mod transformer;
pub mod watermark;

pub use config::Config;
pub use db::{Database, PgDatabase};
pub use error::{
    AllowlistError, ConfigError, KeyCodecError, MatcherError, ProcessorError, QueueError,
    ResolverError, SinkError, TransformerError,
};
pub use model::{Block, Contract, CodeId, IndexerState, WasmStateEvent, WasmStateEventTransformation};
pub use processor::{BatchReport, Processor};

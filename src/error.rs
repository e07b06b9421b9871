//! Error types for each pipeline component.
//!
//! One `thiserror` enum per component, mirroring the per-module `error.rs`
//! convention the CosmWasm keeper uses upstream.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyCodecError {
    #[error("key too short for family {family}: got {len} bytes, need at least {min}")]
    TooShort {
        family: &'static str,
        len: usize,
        min: usize,
    },
    #[error("unrecognized key prefix byte: {0:#04x}")]
    UnrecognizedPrefix(u8),
    #[error("empty key")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("rpc transport error: {0}")]
    Transport(String),
    #[error("rpc returned malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum AllowlistError {
    #[error("chain {chain_id} references unknown code-key group {group}")]
    UnknownCodeKeyGroup { chain_id: String, group: String },
}

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("key is not valid base64")]
    InvalidKeyEncoding,
    #[error("value is not valid base64")]
    InvalidValueEncoding,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum TransformerError {
    #[error(transparent)]
    Database(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("enqueue failed: {0}")]
    Enqueue(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required (env:{0}) but is not set")]
    MissingRequiredEnvVar(String),
}

/// Batch-fatal errors returned by [`crate::processor::Processor::process_batch`].
///
/// Recoverable errors (decode, value-decode) never reach this type; they are
/// downgraded in place by the component that encountered them. Everything
/// here aborts the batch before the watermark advances.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Transformer(#[from] TransformerError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Allowlist(#[from] AllowlistError),
    #[error("chain id is not configured and could not be determined")]
    MissingChainId,
    #[error("missing singleton indexer state during export")]
    MissingIndexerState,
    #[error("batch cancelled before watermark advance")]
    Cancelled,
}

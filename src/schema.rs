//! SQL schema for the five tables backing the pipeline's data model.
//!
//! Running these against a live connection (migration bootstrap) is out of
//! scope; the statements exist so the Sinks' queries below have a concrete
//! `CREATE TABLE` to be checked against, following the table-shape convention
//! in `marketplace/src/database.rs` (composite keys expressed directly in
//! `CREATE TABLE`, upserts via `ON CONFLICT`).

/// Executed in order against a fresh Postgres database. Each statement is
/// idempotent (`IF NOT EXISTS`) so it is safe to run against an already
/// provisioned database during tests.
pub const CREATE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS blocks (
        height BIGINT PRIMARY KEY,
        time_unix_ms BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contracts (
        address TEXT PRIMARY KEY,
        code_id BIGINT NOT NULL DEFAULT 0,
        admin TEXT,
        creator TEXT,
        label TEXT,
        instantiated_at_block_height BIGINT NOT NULL,
        instantiated_at_block_time_unix_ms BIGINT NOT NULL,
        instantiated_at_block_timestamp TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wasm_state_events (
        block_height BIGINT NOT NULL,
        contract_address TEXT NOT NULL,
        key TEXT NOT NULL,
        value BYTEA NOT NULL,
        value_json JSONB,
        delete BOOLEAN NOT NULL,
        code_id BIGINT NOT NULL,
        block_time_unix_ms BIGINT NOT NULL,
        PRIMARY KEY (block_height, contract_address, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wasm_state_event_transformations (
        contract_address TEXT NOT NULL,
        block_height BIGINT NOT NULL,
        name TEXT NOT NULL,
        value JSONB NOT NULL,
        PRIMARY KEY (contract_address, name, block_height)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS indexer_state (
        chain_id TEXT PRIMARY KEY,
        last_wasm_block_height_exported BIGINT NOT NULL DEFAULT 0,
        latest_block_height BIGINT NOT NULL DEFAULT 0,
        latest_block_time_unix_ms BIGINT NOT NULL DEFAULT 0
    )
    "#,
];

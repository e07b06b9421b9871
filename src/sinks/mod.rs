//! Persistence boundary: one sink per table, each wrapping the
//! [`crate::db::Database`] trait the way `marketplace/src/database.rs` wraps
//! a `SqlitePool`. A thin struct per concern rather than one "god" database
//! object, since the processor calls Block, Contract and Event operations in
//! a specific interleaved order.

pub mod block;
pub mod contract;
pub mod event;

pub use block::BlockSink;
pub use contract::ContractSink;
pub use event::EventSink;

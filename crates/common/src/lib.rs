//! Shared identifiers used across the inventory ledger crates.

pub mod types;

pub use types::{ActorId, CorrelationId, ItemId, StockKey, WarehouseId};

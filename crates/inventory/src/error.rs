//! Inventory error types.

use common::{CorrelationId, ItemId, StockKey, WarehouseId};
use ledger_store::StoreError;
use thiserror::Error;

use crate::mutation::MutationMode;

/// Errors returned by the mutation coordinator.
///
/// Every variant carries the key and the requested change so callers can
/// retry or reconcile by hand.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The mutation would leave a negative quantity.
    #[error(
        "Invalid quantity for {key}: {mode} of {amount} from {current} would leave {resulting}"
    )]
    InvalidQuantity {
        key: StockKey,
        mode: MutationMode,
        amount: i64,
        current: i64,
        resulting: i64,
    },

    /// Add, subtract and transfer amounts must be positive.
    #[error("Invalid amount {amount} for {mode}: must be greater than zero")]
    InvalidAmount { mode: MutationMode, amount: i64 },

    /// Manual adjustments must say why.
    #[error("A reason is required for {mode} adjustments on {key}")]
    ReasonRequired { key: StockKey, mode: MutationMode },

    /// Compare-and-set kept losing to other writers.
    #[error("Concurrent modification of {key}: gave up after {attempts} attempts")]
    ConcurrentModification { key: StockKey, attempts: u32 },

    /// The transfer source holds less than requested.
    #[error("Insufficient stock in {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: StockKey,
        requested: i64,
        available: i64,
    },

    /// The quantity was written but its ledger entry was not. An operator
    /// must reconcile the key.
    #[error(
        "Partial mutation of {key}: quantity is now {committed_quantity} but the ledger entry for change {change} was not written: {source}"
    )]
    PartialMutation {
        key: StockKey,
        committed_quantity: i64,
        change: i64,
        source: StoreError,
    },

    /// Transfers need two distinct warehouses.
    #[error("Cannot transfer within warehouse {0}")]
    SameWarehouse(WarehouseId),

    /// The destination leg failed after the source leg committed.
    #[error(
        "Transfer {correlation_id} of {amount} x item {item_id} from warehouse {from} to {to} failed: {reason} (source restored: {compensated})"
    )]
    TransferFailed {
        correlation_id: CorrelationId,
        from: WarehouseId,
        to: WarehouseId,
        item_id: ItemId,
        amount: i64,
        reason: String,
        compensated: bool,
    },

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

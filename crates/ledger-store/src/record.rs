use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorId, CorrelationId, ItemId, StockKey, StoreError, WarehouseId};

/// Identifier of a ledger entry.
///
/// Ids are assigned by the store at append time and strictly increase, so
/// ordering by id is ordering by append.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(i64);

impl EntryId {
    /// Creates an entry id from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw id value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntryId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Current quantity on hand for one item in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Returns the composite key of this record.
    pub fn key(&self) -> StockKey {
        StockKey {
            warehouse_id: self.warehouse_id,
            item_id: self.item_id,
        }
    }
}

/// An immutable audit record of one quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Store-assigned, strictly increasing id.
    pub id: EntryId,

    pub warehouse_id: WarehouseId,

    pub item_id: ItemId,

    /// Signed, never zero.
    pub quantity_change: i64,

    /// Quantity of the stock record right after this change.
    pub resulting_quantity: i64,

    pub reason: String,

    /// Who performed the change.
    pub actor_id: ActorId,

    /// Shared by every entry written on behalf of the same transfer.
    pub correlation_id: Option<CorrelationId>,

    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// Returns the composite key this entry applies to.
    pub fn key(&self) -> StockKey {
        StockKey {
            warehouse_id: self.warehouse_id,
            item_id: self.item_id,
        }
    }
}

/// A ledger entry that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub key: StockKey,
    pub quantity_change: i64,
    pub resulting_quantity: i64,
    pub reason: String,
    pub actor_id: ActorId,
    pub correlation_id: Option<CorrelationId>,
    pub timestamp: DateTime<Utc>,
}

impl NewLedgerEntry {
    /// Creates a new entry builder.
    pub fn builder() -> NewLedgerEntryBuilder {
        NewLedgerEntryBuilder::default()
    }

    /// Checks the invariants every stored entry must satisfy.
    pub fn validate(&self) -> crate::Result<()> {
        if self.quantity_change == 0 {
            return Err(StoreError::InvalidEntry(format!(
                "quantity change for {} must be non-zero",
                self.key
            )));
        }
        if self.resulting_quantity < 0 {
            return Err(StoreError::InvalidEntry(format!(
                "resulting quantity for {} must not be negative, got {}",
                self.key, self.resulting_quantity
            )));
        }
        Ok(())
    }

    /// Attaches a store-assigned id, producing the persisted form.
    pub fn into_entry(self, id: EntryId) -> LedgerEntry {
        LedgerEntry {
            id,
            warehouse_id: self.key.warehouse_id,
            item_id: self.key.item_id,
            quantity_change: self.quantity_change,
            resulting_quantity: self.resulting_quantity,
            reason: self.reason,
            actor_id: self.actor_id,
            correlation_id: self.correlation_id,
            timestamp: self.timestamp,
        }
    }
}

/// Builder for constructing new ledger entries.
#[derive(Debug, Default)]
pub struct NewLedgerEntryBuilder {
    key: Option<StockKey>,
    quantity_change: Option<i64>,
    resulting_quantity: Option<i64>,
    reason: Option<String>,
    actor_id: Option<ActorId>,
    correlation_id: Option<CorrelationId>,
    timestamp: Option<DateTime<Utc>>,
}

impl NewLedgerEntryBuilder {
    /// Sets the stock key the entry applies to.
    pub fn key(mut self, key: StockKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Sets the signed quantity change.
    pub fn quantity_change(mut self, change: i64) -> Self {
        self.quantity_change = Some(change);
        self
    }

    /// Sets the quantity after the change.
    pub fn resulting_quantity(mut self, quantity: i64) -> Self {
        self.resulting_quantity = Some(quantity);
        self
    }

    /// Sets the reason.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the actor performing the change.
    pub fn actor_id(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Sets the transfer correlation id.
    pub fn correlation_id(mut self, correlation_id: Option<CorrelationId>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builds and validates the entry.
    pub fn build(self) -> crate::Result<NewLedgerEntry> {
        let missing = |field: &str| StoreError::InvalidEntry(format!("{field} is required"));

        let entry = NewLedgerEntry {
            key: self.key.ok_or_else(|| missing("key"))?,
            quantity_change: self.quantity_change.ok_or_else(|| missing("quantity_change"))?,
            resulting_quantity: self
                .resulting_quantity
                .ok_or_else(|| missing("resulting_quantity"))?,
            reason: self.reason.unwrap_or_default(),
            actor_id: self.actor_id.ok_or_else(|| missing("actor_id"))?,
            correlation_id: self.correlation_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        };
        entry.validate()?;
        Ok(entry)
    }
}

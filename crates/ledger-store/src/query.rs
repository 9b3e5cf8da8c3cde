use crate::{CorrelationId, ItemId, StockKey, WarehouseId};

/// Filter and page for ledger history reads.
///
/// Results are always returned newest first. Leaving every filter unset
/// selects the global history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerQuery {
    /// Filter by item.
    pub item_id: Option<ItemId>,

    /// Filter by warehouse.
    pub warehouse_id: Option<WarehouseId>,

    /// Filter by transfer correlation id.
    pub correlation_id: Option<CorrelationId>,

    /// Maximum number of entries to return.
    pub limit: Option<usize>,

    /// Number of entries to skip.
    pub offset: Option<usize>,
}

impl LedgerQuery {
    /// Creates a new empty query (global history, unbounded).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one stock record's history.
    pub fn for_key(key: StockKey) -> Self {
        Self {
            item_id: Some(key.item_id),
            warehouse_id: Some(key.warehouse_id),
            ..Default::default()
        }
    }

    /// Creates a query for the entries of one transfer.
    pub fn for_correlation(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            ..Default::default()
        }
    }

    /// Filters by item.
    pub fn item_id(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    /// Filters by warehouse.
    pub fn warehouse_id(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    /// Limits the number of entries returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many entries before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the entry for `key` with `correlation_id` passes the filters.
    pub fn matches(&self, key: StockKey, correlation_id: Option<CorrelationId>) -> bool {
        if let Some(item_id) = self.item_id
            && key.item_id != item_id
        {
            return false;
        }
        if let Some(warehouse_id) = self.warehouse_id
            && key.warehouse_id != warehouse_id
        {
            return false;
        }
        if let Some(wanted) = self.correlation_id
            && correlation_id != Some(wanted)
        {
            return false;
        }
        true
    }
}

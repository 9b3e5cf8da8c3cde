//! Read-only queries over current stock and the ledger.

use chrono::{DateTime, Utc};
use common::{ItemId, WarehouseId};
use futures_util::TryStreamExt;
use ledger_store::{LedgerEntry, LedgerQuery, LedgerWriter, QuantityStore, StockRecord};

use crate::Result;
use crate::catalog::{ItemCatalog, ItemInfo};

/// A stock record with catalog metadata attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockView {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
    /// None when the catalog does not know the item.
    pub name: Option<String>,
    pub price_cents: Option<i64>,
}

impl StockView {
    fn from_parts(record: StockRecord, item: Option<&ItemInfo>) -> Self {
        Self {
            warehouse_id: record.warehouse_id,
            item_id: record.item_id,
            quantity: record.quantity,
            updated_at: record.updated_at,
            name: item.map(|i| i.name.clone()),
            price_cents: item.map(|i| i.price_cents),
        }
    }
}

/// Filters and page bounds for a history read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub item_id: Option<ItemId>,
    pub warehouse_id: Option<WarehouseId>,
    pub limit: usize,
    pub offset: usize,
}

impl HistoryRequest {
    pub fn new(limit: usize) -> Self {
        Self {
            item_id: None,
            warehouse_id: None,
            limit,
            offset: 0,
        }
    }

    pub fn item_id(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn warehouse_id(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// One page of ledger history, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub entries: Vec<LedgerEntry>,
    pub limit: usize,
    pub offset: usize,
}

/// Answers reads. Never writes.
#[derive(Clone)]
pub struct QueryFacade<S, C> {
    store: S,
    catalog: C,
}

impl<S, C> QueryFacade<S, C>
where
    S: QuantityStore + LedgerWriter,
    C: ItemCatalog,
{
    pub fn new(store: S, catalog: C) -> Self {
        Self { store, catalog }
    }

    /// Every stock record, optionally for one warehouse, ordered by key.
    #[tracing::instrument(skip(self))]
    pub async fn list_current_stock(
        &self,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<Vec<StockView>> {
        metrics::counter!("inventory_queries_total", "query" => "current_stock").increment(1);
        let records = self.store.list(warehouse_id).await?;
        self.join_catalog(records).await
    }

    /// Records at or below `threshold`, lowest quantity first.
    #[tracing::instrument(skip(self))]
    pub async fn list_low_stock(
        &self,
        threshold: i64,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<Vec<StockView>> {
        metrics::counter!("inventory_queries_total", "query" => "low_stock").increment(1);
        let mut records: Vec<_> = self
            .store
            .list(warehouse_id)
            .await?
            .into_iter()
            .filter(|r| r.quantity <= threshold)
            .collect();
        records.sort_by_key(|r| (r.quantity, r.key()));

        tracing::debug!(threshold, count = records.len(), "low stock listed");
        self.join_catalog(records).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_history(&self, request: HistoryRequest) -> Result<HistoryPage> {
        metrics::counter!("inventory_queries_total", "query" => "history").increment(1);

        let mut query = LedgerQuery::new()
            .limit(request.limit)
            .offset(request.offset);
        if let Some(item_id) = request.item_id {
            query = query.item_id(item_id);
        }
        if let Some(warehouse_id) = request.warehouse_id {
            query = query.warehouse_id(warehouse_id);
        }

        let entries: Vec<LedgerEntry> = self.store.query(query).await?.try_collect().await?;

        Ok(HistoryPage {
            entries,
            limit: request.limit,
            offset: request.offset,
        })
    }

    async fn join_catalog(&self, records: Vec<StockRecord>) -> Result<Vec<StockView>> {
        let mut ids: Vec<ItemId> = records.iter().map(|r| r.item_id).collect();
        ids.sort();
        ids.dedup();
        let items = self.catalog.get_many(&ids).await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let item = items.get(&record.item_id);
                StockView::from_parts(record, item)
            })
            .collect())
    }
}

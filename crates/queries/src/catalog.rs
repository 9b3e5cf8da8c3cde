//! Item metadata owned by the product catalog.
//!
//! The ledger never writes items; it only reads names and prices to decorate
//! stock listings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ItemId;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;

use crate::Result;

/// Catalog data for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: ItemId,
    pub name: String,
    pub price_cents: i64,
}

impl ItemInfo {
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>, price_cents: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price_cents,
        }
    }
}

/// Read-only access to item metadata.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn get(&self, item_id: ItemId) -> Result<Option<ItemInfo>>;

    /// Looks up several items at once. Unknown ids are absent from the map.
    async fn get_many(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, ItemInfo>>;
}

/// Catalog held in memory, filled by the caller.
#[derive(Clone, Default)]
pub struct InMemoryItemCatalog {
    items: Arc<RwLock<HashMap<ItemId, ItemInfo>>>,
}

impl InMemoryItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item.
    pub async fn insert(&self, item: ItemInfo) {
        self.items.write().await.insert(item.id, item);
    }
}

#[async_trait]
impl ItemCatalog for InMemoryItemCatalog {
    async fn get(&self, item_id: ItemId) -> Result<Option<ItemInfo>> {
        Ok(self.items.read().await.get(&item_id).cloned())
    }

    async fn get_many(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, ItemInfo>> {
        let items = self.items.read().await;
        Ok(item_ids
            .iter()
            .filter_map(|id| items.get(id).map(|item| (*id, item.clone())))
            .collect())
    }
}

/// Catalog backed by the `items` table.
#[derive(Clone)]
pub struct PostgresItemCatalog {
    pool: PgPool,
}

impl PostgresItemCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_item(row: &sqlx::postgres::PgRow) -> Result<ItemInfo> {
        Ok(ItemInfo {
            id: ItemId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            price_cents: row.try_get("price_cents")?,
        })
    }
}

#[async_trait]
impl ItemCatalog for PostgresItemCatalog {
    async fn get(&self, item_id: ItemId) -> Result<Option<ItemInfo>> {
        let row = sqlx::query("SELECT id, name, price_cents FROM items WHERE id = $1")
            .bind(item_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn get_many(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, ItemInfo>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<i64> = item_ids.iter().map(ItemId::as_i64).collect();

        let rows = sqlx::query("SELECT id, name, price_cents FROM items WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Self::row_to_item(row).map(|item| (item.id, item)))
            .collect()
    }
}

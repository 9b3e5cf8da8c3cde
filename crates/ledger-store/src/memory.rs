use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    EntryId, LedgerEntry, LedgerQuery, NewLedgerEntry, Result, StockKey, StockRecord, StoreError,
    WarehouseId,
    store::{
        CasOutcome, CommitOutcome, LedgerStream, LedgerWriter, QuantityStore, ReplaySnapshot,
        StockStore, validate_entries_for_append,
    },
};

/// Injected failures, used to exercise error paths in tests.
#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    fail_on_append: AtomicBool,
    failing_warehouses: RwLock<HashSet<WarehouseId>>,
}

/// In-memory stock store for tests and single-node deployments.
///
/// Quantities and the ledger live behind separate locks. Whenever both are
/// held, `records` is taken first.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    records: Arc<RwLock<HashMap<StockKey, StockRecord>>>,
    ledger: Arc<RwLock<Vec<LedgerEntry>>>,
    last_id: Arc<AtomicI64>,
    faults: Arc<Faults>,
}

impl InMemoryStockStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger entries stored.
    pub async fn entry_count(&self) -> usize {
        self.ledger.read().await.len()
    }

    /// Simulates the whole store being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes every ledger append fail while quantity writes keep working.
    pub fn set_fail_on_append(&self, fail: bool) {
        self.faults.fail_on_append.store(fail, Ordering::SeqCst);
    }

    /// Makes quantity writes to one warehouse fail.
    pub async fn fail_writes_for(&self, warehouse_id: WarehouseId) {
        self.faults
            .failing_warehouses
            .write()
            .await
            .insert(warehouse_id);
    }

    /// Clears every injected failure.
    pub async fn clear_faults(&self) {
        self.set_unavailable(false);
        self.set_fail_on_append(false);
        self.faults.failing_warehouses.write().await.clear();
    }

    /// Writes a quantity without a ledger entry, bypassing all checks.
    ///
    /// Only useful to set up drift between the stored quantity and the
    /// ledger, which the reconciliation path repairs.
    pub async fn force_quantity(&self, key: StockKey, quantity: i64) {
        self.records.write().await.insert(
            key,
            StockRecord {
                warehouse_id: key.warehouse_id,
                item_id: key.item_id,
                quantity,
                updated_at: Utc::now(),
            },
        );
    }

    fn next_id(&self) -> EntryId {
        EntryId::new(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn check_writable(&self, key: StockKey, new: i64) -> Result<()> {
        self.check_available()?;
        if self
            .faults
            .failing_warehouses
            .read()
            .await
            .contains(&key.warehouse_id)
        {
            return Err(StoreError::Unavailable(format!(
                "writes to warehouse {} are failing",
                key.warehouse_id
            )));
        }
        if new < 0 {
            return Err(StoreError::InvalidEntry(format!(
                "quantity for {key} must not be negative, got {new}"
            )));
        }
        Ok(())
    }

    fn check_available(&self) -> Result<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl QuantityStore for InMemoryStockStore {
    async fn get_record(&self, key: StockKey) -> Result<Option<StockRecord>> {
        self.check_available()?;
        Ok(self.records.read().await.get(&key).cloned())
    }

    async fn compare_and_set(&self, key: StockKey, expected: i64, new: i64) -> Result<CasOutcome> {
        self.check_writable(key, new).await?;

        let mut records = self.records.write().await;
        let actual = records.get(&key).map(|r| r.quantity).unwrap_or(0);
        if actual != expected {
            return Ok(CasOutcome::Conflict { actual });
        }

        let record = StockRecord {
            warehouse_id: key.warehouse_id,
            item_id: key.item_id,
            quantity: new,
            updated_at: Utc::now(),
        };
        records.insert(key, record.clone());
        Ok(CasOutcome::Applied(record))
    }

    async fn list(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<StockRecord>> {
        self.check_available()?;
        let records = self.records.read().await;
        let mut listed: Vec<_> = records
            .values()
            .filter(|r| warehouse_id.is_none_or(|w| r.warehouse_id == w))
            .cloned()
            .collect();
        listed.sort_by_key(StockRecord::key);
        Ok(listed)
    }
}

#[async_trait]
impl LedgerWriter for InMemoryStockStore {
    async fn append_batch(&self, entries: Vec<NewLedgerEntry>) -> Result<Vec<EntryId>> {
        self.check_available()?;
        validate_entries_for_append(&entries)?;
        if self.faults.fail_on_append.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger append failed".to_string()));
        }

        // Ids are drawn under the write lock so the vector stays in id order.
        let mut ledger = self.ledger.write().await;
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = self.next_id();
            ledger.push(entry.into_entry(id));
            ids.push(id);
        }
        metrics::counter!("ledger_entries_appended_total", "backend" => "memory")
            .increment(ids.len() as u64);
        Ok(ids)
    }

    async fn query(&self, query: LedgerQuery) -> Result<LedgerStream> {
        use futures_util::stream;

        self.check_available()?;
        let ledger = self.ledger.read().await;
        let page: Vec<LedgerEntry> = ledger
            .iter()
            .rev()
            .filter(|e| query.matches(e.key(), e.correlation_id))
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(Box::pin(stream::iter(page.into_iter().map(Ok))))
    }

    async fn replay_sum(&self, key: StockKey) -> Result<i64> {
        self.check_available()?;
        let ledger = self.ledger.read().await;
        Ok(ledger
            .iter()
            .filter(|e| e.key() == key)
            .map(|e| e.quantity_change)
            .sum())
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn commit_mutation(&self, expected: i64, entry: NewLedgerEntry) -> Result<CommitOutcome> {
        entry.validate()?;
        let key = entry.key;
        self.check_writable(key, entry.resulting_quantity).await?;

        // Held until the entry is pushed: ledger ids follow quantity writes.
        let mut records = self.records.write().await;
        let actual = records.get(&key).map(|r| r.quantity).unwrap_or(0);
        if actual != expected {
            return Ok(CommitOutcome::Conflict { actual });
        }

        let record = StockRecord {
            warehouse_id: key.warehouse_id,
            item_id: key.item_id,
            quantity: entry.resulting_quantity,
            updated_at: Utc::now(),
        };
        records.insert(key, record.clone());

        if self.faults.fail_on_append.load(Ordering::SeqCst) {
            drop(records);
            let error = StoreError::Unavailable("ledger append failed".to_string());
            metrics::counter!("ledger_append_failures_total").increment(1);
            tracing::error!(%key, %error, "ledger append failed after quantity write");
            return Ok(CommitOutcome::LedgerFailed { record, error });
        }

        let mut ledger = self.ledger.write().await;
        let entry_id = self.next_id();
        ledger.push(entry.into_entry(entry_id));
        metrics::counter!("ledger_entries_appended_total", "backend" => "memory").increment(1);

        Ok(CommitOutcome::Committed { record, entry_id })
    }

    async fn replay_snapshot(&self, key: StockKey) -> Result<Option<ReplaySnapshot>> {
        self.check_available()?;
        let records = self.records.read().await;
        let ledger = self.ledger.read().await;

        let stored = records.get(&key).map(|r| r.quantity).unwrap_or(0);
        let replayed = ledger
            .iter()
            .filter(|e| e.key() == key)
            .map(|e| e.quantity_change)
            .sum();
        Ok(Some(ReplaySnapshot { stored, replayed }))
    }
}

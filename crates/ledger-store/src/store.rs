use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    EntryId, LedgerEntry, LedgerQuery, NewLedgerEntry, Result, StockKey, StockRecord, StoreError,
    WarehouseId,
};

/// Outcome of a compare-and-set on a stock record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored quantity matched and the new quantity was written.
    Applied(StockRecord),

    /// Another writer got there first; `actual` is the quantity now stored.
    Conflict { actual: i64 },
}

/// Outcome of committing a quantity change together with its ledger entry.
#[derive(Debug)]
pub enum CommitOutcome {
    /// Both the quantity and the ledger entry are stored.
    Committed {
        record: StockRecord,
        entry_id: EntryId,
    },

    /// The compare-and-set lost; nothing was written.
    Conflict { actual: i64 },

    /// The quantity was written but the ledger append failed. The stored
    /// quantity and the ledger disagree until someone reconciles the key.
    LedgerFailed {
        record: StockRecord,
        error: StoreError,
    },
}

/// Stored quantity and ledger replay sum for one key, read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySnapshot {
    pub stored: i64,
    pub replayed: i64,
}

impl ReplaySnapshot {
    /// `stored - replayed`; zero when the ledger replays to the stored quantity.
    pub fn drift(&self) -> i64 {
        self.stored - self.replayed
    }
}

/// A stream of ledger entries.
pub type LedgerStream = Pin<Box<dyn Stream<Item = Result<LedgerEntry>> + Send>>;

/// Durable mapping of (warehouse, item) to the current quantity.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait QuantityStore: Send + Sync {
    /// Returns the full record, or None if the key was never mutated.
    async fn get_record(&self, key: StockKey) -> Result<Option<StockRecord>>;

    /// Returns the current quantity; a key that was never mutated holds 0.
    async fn get(&self, key: StockKey) -> Result<i64> {
        Ok(self
            .get_record(key)
            .await?
            .map(|record| record.quantity)
            .unwrap_or(0))
    }

    /// Writes `new` only if the stored quantity still equals `expected`.
    ///
    /// An absent record counts as quantity 0 and is created on success.
    /// `updated_at` is refreshed on every successful write.
    async fn compare_and_set(&self, key: StockKey, expected: i64, new: i64) -> Result<CasOutcome>;

    /// Lists stock records ordered by (warehouse, item), optionally for one warehouse.
    async fn list(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<StockRecord>>;
}

/// Append-only history of quantity changes.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Appends one entry and returns its id.
    async fn append(&self, entry: NewLedgerEntry) -> Result<EntryId> {
        let ids = self.append_batch(vec![entry]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidEntry("append returned no id".to_string()))
    }

    /// Appends entries atomically: either all are stored or none are.
    ///
    /// Ids are assigned in the order the entries are given.
    async fn append_batch(&self, entries: Vec<NewLedgerEntry>) -> Result<Vec<EntryId>>;

    /// Streams the entries matching `query`, newest first.
    ///
    /// Issuing the same query again with no intervening append yields the
    /// same entries.
    async fn query(&self, query: LedgerQuery) -> Result<LedgerStream>;

    /// Sums every recorded change for a key, starting from zero.
    async fn replay_sum(&self, key: StockKey) -> Result<i64>;
}

/// A backend that stores both quantities and the ledger.
#[async_trait]
pub trait StockStore: QuantityStore + LedgerWriter {
    /// Moves the key from `expected` to `entry.resulting_quantity` and records
    /// `entry`.
    ///
    /// The default body writes the quantity first and the ledger second, so it
    /// can report [`CommitOutcome::LedgerFailed`]. Backends with transactions
    /// override it to make both writes atomic.
    async fn commit_mutation(&self, expected: i64, entry: NewLedgerEntry) -> Result<CommitOutcome> {
        entry.validate()?;
        let key = entry.key;

        match self
            .compare_and_set(key, expected, entry.resulting_quantity)
            .await?
        {
            CasOutcome::Conflict { actual } => Ok(CommitOutcome::Conflict { actual }),
            CasOutcome::Applied(record) => match self.append(entry).await {
                Ok(entry_id) => Ok(CommitOutcome::Committed { record, entry_id }),
                Err(error) => {
                    metrics::counter!("ledger_append_failures_total").increment(1);
                    tracing::error!(%key, %error, "ledger append failed after quantity write");
                    Ok(CommitOutcome::LedgerFailed { record, error })
                }
            },
        }
    }

    /// Reads the stored quantity and the replay sum for `key`.
    ///
    /// The default body reads the quantity on both sides of the sum and
    /// returns None when it moved in between. Backends that can read both
    /// under one lock or statement override it and always return a snapshot.
    async fn replay_snapshot(&self, key: StockKey) -> Result<Option<ReplaySnapshot>> {
        let stored = self.get(key).await?;
        let replayed = self.replay_sum(key).await?;
        if self.get(key).await? != stored {
            return Ok(None);
        }
        Ok(Some(ReplaySnapshot { stored, replayed }))
    }
}

/// Validates a batch before appending.
pub fn validate_entries_for_append(entries: &[NewLedgerEntry]) -> Result<()> {
    if entries.is_empty() {
        return Err(StoreError::InvalidEntry(
            "Cannot append empty entry list".to_string(),
        ));
    }
    entries.iter().try_for_each(NewLedgerEntry::validate)
}

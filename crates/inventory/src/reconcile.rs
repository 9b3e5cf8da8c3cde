//! Repair of keys whose ledger no longer replays to the stored quantity.
//!
//! A [`PartialMutation`](crate::InventoryError::PartialMutation) leaves the
//! stored quantity ahead of the ledger. Reconciliation treats the stored
//! quantity as the truth and appends one correcting entry for the drift.
//! The entry is committed against the quantity it was computed from, so a
//! mutation landing in between sends reconciliation back for a fresh read.

use common::{ActorId, StockKey};
use ledger_store::{CommitOutcome, EntryId, NewLedgerEntry, StockStore};

use crate::coordinator::MutationCoordinator;
use crate::error::{InventoryError, Result};

/// Reason recorded on correcting entries.
pub const RECONCILIATION_REASON: &str = "reconciliation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub key: StockKey,
    /// Quantity in the store.
    pub stored: i64,
    /// Sum of ledger changes before the correction.
    pub replayed: i64,
    /// `stored - replayed`; zero when nothing needed fixing.
    pub drift: i64,
    /// The correcting entry, if one was written.
    pub entry_id: Option<EntryId>,
}

impl<S: StockStore> MutationCoordinator<S> {
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, key: StockKey, actor_id: ActorId) -> Result<ReconcileOutcome> {
        for attempt in 1..=self.max_attempts() {
            let Some(snapshot) = self.store().replay_snapshot(key).await? else {
                tracing::debug!(%key, attempt, "quantity moved during reconciliation, retrying");
                tokio::task::yield_now().await;
                continue;
            };

            let (stored, replayed, drift) = (snapshot.stored, snapshot.replayed, snapshot.drift());
            if drift == 0 {
                tracing::info!(%key, stored, "ledger already consistent");
                return Ok(ReconcileOutcome {
                    key,
                    stored,
                    replayed,
                    drift,
                    entry_id: None,
                });
            }

            let entry = NewLedgerEntry::builder()
                .key(key)
                .quantity_change(drift)
                .resulting_quantity(stored)
                .reason(RECONCILIATION_REASON)
                .actor_id(actor_id)
                .build()?;

            // Leaves the quantity as it is; only the entry is new.
            let entry_id = match self.store().commit_mutation(stored, entry).await? {
                CommitOutcome::Committed { entry_id, .. } => entry_id,
                CommitOutcome::Conflict { actual } => {
                    tracing::debug!(%key, attempt, stored, actual, "quantity moved before correction, retrying");
                    tokio::task::yield_now().await;
                    continue;
                }
                CommitOutcome::LedgerFailed { error, .. } => return Err(error.into()),
            };

            metrics::counter!("inventory_reconciliations_total").increment(1);
            tracing::warn!(%key, stored, replayed, drift, %entry_id, "ledger drift corrected");

            return Ok(ReconcileOutcome {
                key,
                stored,
                replayed,
                drift,
                entry_id: Some(entry_id),
            });
        }

        Err(InventoryError::ConcurrentModification {
            key,
            attempts: self.max_attempts(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MutationRequest;
    use ledger_store::{InMemoryStockStore, LedgerWriter, QuantityStore};

    #[tokio::test]
    async fn consistent_key_needs_no_entry() {
        let coordinator = MutationCoordinator::new(InMemoryStockStore::new());
        let key = StockKey::new(1, 1);
        coordinator.seed(key, 9, ActorId::new(1)).await.unwrap();

        let outcome = coordinator.reconcile(key, ActorId::new(2)).await.unwrap();

        assert_eq!(outcome.drift, 0);
        assert!(outcome.entry_id.is_none());
        assert_eq!(coordinator.store().entry_count().await, 1);
    }

    #[tokio::test]
    async fn partial_mutation_is_repaired() {
        let coordinator = MutationCoordinator::new(InMemoryStockStore::new());
        let key = StockKey::new(1, 1);
        coordinator.seed(key, 10, ActorId::new(1)).await.unwrap();

        coordinator.store().set_fail_on_append(true);
        let partial = coordinator
            .apply_mutation(MutationRequest::add(key, 5, ActorId::new(1)))
            .await;
        assert!(matches!(partial, Err(InventoryError::PartialMutation { .. })));
        coordinator.store().set_fail_on_append(false);

        let outcome = coordinator.reconcile(key, ActorId::new(2)).await.unwrap();

        assert_eq!(outcome.stored, 15);
        assert_eq!(outcome.replayed, 10);
        assert_eq!(outcome.drift, 5);
        assert!(outcome.entry_id.is_some());
        assert_eq!(coordinator.store().replay_sum(key).await.unwrap(), 15);
        assert_eq!(coordinator.store().get(key).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn negative_drift_is_recorded() {
        let coordinator = MutationCoordinator::new(InMemoryStockStore::new());
        let key = StockKey::new(1, 1);
        coordinator.seed(key, 10, ActorId::new(1)).await.unwrap();
        coordinator.store().force_quantity(key, 4).await;

        let outcome = coordinator.reconcile(key, ActorId::new(2)).await.unwrap();

        assert_eq!(outcome.drift, -6);
        assert_eq!(coordinator.store().replay_sum(key).await.unwrap(), 4);
    }
}

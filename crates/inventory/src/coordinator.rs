//! The only path through which stock quantities change.

use std::time::Instant;

use common::{ActorId, CorrelationId, StockKey};
use ledger_store::{CasOutcome, CommitOutcome, NewLedgerEntry, StockStore};

use crate::error::{InventoryError, Result};
use crate::mutation::{MutationMode, MutationOutcome, MutationRequest};

/// Read-compute-write cycles before giving up on a contended key.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Reason recorded when a stock record is seeded.
pub const SEED_REASON: &str = "initial stock";

/// Validates requested changes and applies them to the quantity store and
/// the ledger.
///
/// No lock is held across a read-compute-write cycle. Writers to the same key
/// race on compare-and-set; the loser re-reads and retries, up to
/// `max_attempts` cycles.
pub struct MutationCoordinator<S: StockStore> {
    store: S,
    max_attempts: u32,
}

impl<S: StockStore> MutationCoordinator<S> {
    /// Creates a coordinator with [`DEFAULT_MAX_ATTEMPTS`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Overrides the retry bound. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Applies a set / add / subtract to one stock record.
    #[tracing::instrument(
        skip(self, request),
        fields(key = %request.key, mode = %request.mode, amount = request.amount)
    )]
    pub async fn apply_mutation(&self, request: MutationRequest) -> Result<MutationOutcome> {
        let reason = request.validate()?;
        self.apply_validated(
            request.key,
            request.mode,
            request.amount,
            reason,
            request.actor_id,
            request.correlation_id,
        )
        .await
    }

    /// Creates or overwrites a stock record with an absolute quantity.
    #[tracing::instrument(skip(self))]
    pub async fn seed(
        &self,
        key: StockKey,
        quantity: i64,
        actor_id: ActorId,
    ) -> Result<MutationOutcome> {
        self.apply_mutation(MutationRequest::set(key, quantity, actor_id).with_reason(SEED_REASON))
            .await
    }

    /// The optimistic read-compute-write loop behind every mutation.
    pub(crate) async fn apply_validated(
        &self,
        key: StockKey,
        mode: MutationMode,
        amount: i64,
        reason: String,
        actor_id: ActorId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<MutationOutcome> {
        metrics::counter!("inventory_mutations_total", "mode" => mode.as_str()).increment(1);
        let started = Instant::now();

        for attempt in 1..=self.max_attempts {
            let current = self.store.get(key).await?;

            let invalid = || InventoryError::InvalidQuantity {
                key,
                mode,
                amount,
                current,
                resulting: current
                    .saturating_add(mode.quantity_change(current, amount).unwrap_or(0)),
            };
            let change = mode.quantity_change(current, amount).ok_or_else(invalid)?;
            let resulting = current.checked_add(change).ok_or_else(invalid)?;
            if resulting < 0 {
                metrics::counter!("inventory_mutations_rejected_total", "reason" => "negative")
                    .increment(1);
                return Err(invalid());
            }

            let committed = if change == 0 {
                // Nothing to record; still upsert so the record exists.
                match self.store.compare_and_set(key, current, current).await? {
                    CasOutcome::Applied(record) => Some((record, None)),
                    CasOutcome::Conflict { .. } => None,
                }
            } else {
                let entry = NewLedgerEntry::builder()
                    .key(key)
                    .quantity_change(change)
                    .resulting_quantity(resulting)
                    .reason(reason.clone())
                    .actor_id(actor_id)
                    .correlation_id(correlation_id)
                    .build()?;

                match self.store.commit_mutation(current, entry).await? {
                    CommitOutcome::Committed { record, entry_id } => Some((record, Some(entry_id))),
                    CommitOutcome::Conflict { .. } => None,
                    CommitOutcome::LedgerFailed { record, error } => {
                        metrics::counter!("inventory_partial_mutations_total").increment(1);
                        return Err(InventoryError::PartialMutation {
                            key,
                            committed_quantity: record.quantity,
                            change,
                            source: error,
                        });
                    }
                }
            };

            match committed {
                Some((record, entry_id)) => {
                    metrics::histogram!("inventory_mutation_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    tracing::info!(
                        %key,
                        change,
                        resulting = record.quantity,
                        attempt,
                        "stock mutation applied"
                    );
                    return Ok(MutationOutcome {
                        record,
                        quantity_change: change,
                        entry_id,
                        attempts: attempt,
                    });
                }
                None => {
                    metrics::counter!("inventory_cas_conflicts_total").increment(1);
                    tracing::debug!(%key, attempt, expected = current, "compare-and-set conflict, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }

        tracing::warn!(%key, attempts = self.max_attempts, "giving up on contended key");
        Err(InventoryError::ConcurrentModification {
            key,
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::{InMemoryStockStore, LedgerQuery, LedgerWriter, QuantityStore};

    use futures_util::TryStreamExt;

    fn actor() -> ActorId {
        ActorId::new(42)
    }

    async fn seeded(quantity: i64) -> (MutationCoordinator<InMemoryStockStore>, StockKey) {
        let coordinator = MutationCoordinator::new(InMemoryStockStore::new());
        let key = StockKey::new(1, 7);
        coordinator.seed(key, quantity, actor()).await.unwrap();
        (coordinator, key)
    }

    #[tokio::test]
    async fn add_creates_record_on_first_mutation() {
        let coordinator = MutationCoordinator::new(InMemoryStockStore::new());
        let key = StockKey::new(3, 9);

        let outcome = coordinator
            .apply_mutation(MutationRequest::add(key, 12, actor()))
            .await
            .unwrap();

        assert_eq!(outcome.record.quantity, 12);
        assert_eq!(outcome.quantity_change, 12);
        assert!(outcome.entry_id.is_some());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(coordinator.store().get(key).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn set_to_zero_records_damage() {
        let (coordinator, key) = seeded(5).await;

        let outcome = coordinator
            .apply_mutation(MutationRequest::set(key, 0, actor()).with_reason("damaged"))
            .await
            .unwrap();

        assert_eq!(outcome.quantity_change, -5);
        assert_eq!(outcome.record.quantity, 0);

        let latest: Vec<_> = coordinator
            .store()
            .query(LedgerQuery::for_key(key).limit(1))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(latest[0].quantity_change, -5);
        assert_eq!(latest[0].resulting_quantity, 0);
        assert_eq!(latest[0].reason, "damaged");
        assert_eq!(latest[0].actor_id, actor());
    }

    #[tokio::test]
    async fn subtract_below_zero_is_rejected_without_state_change() {
        let (coordinator, key) = seeded(3).await;
        let entries_before = coordinator.store().entry_count().await;

        let result = coordinator
            .apply_mutation(MutationRequest::subtract(key, 4, actor()).with_reason("sold"))
            .await;

        assert!(matches!(
            result,
            Err(InventoryError::InvalidQuantity {
                current: 3,
                resulting: -1,
                ..
            })
        ));
        assert_eq!(coordinator.store().get(key).await.unwrap(), 3);
        assert_eq!(coordinator.store().entry_count().await, entries_before);
    }

    #[tokio::test]
    async fn set_negative_is_rejected() {
        let (coordinator, key) = seeded(3).await;

        let result = coordinator
            .apply_mutation(MutationRequest::set(key, -2, actor()).with_reason("typo"))
            .await;

        assert!(matches!(result, Err(InventoryError::InvalidQuantity { .. })));
        assert_eq!(coordinator.store().get(key).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn set_to_same_value_writes_no_entry() {
        let (coordinator, key) = seeded(8).await;
        let entries_before = coordinator.store().entry_count().await;

        let outcome = coordinator
            .apply_mutation(MutationRequest::set(key, 8, actor()).with_reason("count"))
            .await
            .unwrap();

        assert_eq!(outcome.quantity_change, 0);
        assert!(outcome.entry_id.is_none());
        assert_eq!(coordinator.store().entry_count().await, entries_before);
    }

    #[tokio::test]
    async fn seed_with_zero_creates_visible_record() {
        let coordinator = MutationCoordinator::new(InMemoryStockStore::new());
        let key = StockKey::new(1, 1);

        coordinator.seed(key, 0, actor()).await.unwrap();

        assert!(coordinator.store().get_record(key).await.unwrap().is_some());
        assert_eq!(coordinator.store().entry_count().await, 0);
    }

    #[tokio::test]
    async fn ledger_failure_surfaces_partial_mutation() {
        let (coordinator, key) = seeded(10).await;
        coordinator.store().set_fail_on_append(true);

        let result = coordinator
            .apply_mutation(MutationRequest::add(key, 5, actor()))
            .await;

        match result {
            Err(InventoryError::PartialMutation {
                key: failed_key,
                committed_quantity,
                change,
                ..
            }) => {
                assert_eq!(failed_key, key);
                assert_eq!(committed_quantity, 15);
                assert_eq!(change, 5);
            }
            other => panic!("expected PartialMutation, got {other:?}"),
        }
        // Known gap: the quantity write is not rolled back.
        assert_eq!(coordinator.store().get(key).await.unwrap(), 15);
        assert_eq!(coordinator.store().replay_sum(key).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn unavailable_store_surfaces_storage_error() {
        let (coordinator, key) = seeded(10).await;
        coordinator.store().set_unavailable(true);

        let result = coordinator
            .apply_mutation(MutationRequest::add(key, 1, actor()))
            .await;

        assert!(matches!(result, Err(InventoryError::Storage(_))));
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let coordinator = MutationCoordinator::new(InMemoryStockStore::new()).with_max_attempts(0);
        assert_eq!(coordinator.max_attempts(), 1);
    }
}

//! Transfers between warehouses.
//!
//! A transfer is two mutations sharing one correlation id: a subtract on the
//! source and an add on the destination. If the destination leg fails after
//! the source committed, the source is restored with a compensating add.

use std::time::Instant;

use common::{ActorId, CorrelationId, ItemId, StockKey, WarehouseId};
use ledger_store::{StockRecord, StockStore};

use crate::coordinator::MutationCoordinator;
use crate::error::{InventoryError, Result};
use crate::mutation::MutationMode;

/// Reason recorded on the entry that restores the source.
pub const COMPENSATION_REASON: &str = "transfer compensation";

/// Moves `amount` units of one item from one warehouse to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: WarehouseId,
    pub to: WarehouseId,
    pub item_id: ItemId,
    pub amount: i64,
    pub actor_id: ActorId,
}

impl TransferRequest {
    pub fn source(&self) -> StockKey {
        StockKey::new(self.from, self.item_id)
    }

    pub fn destination(&self) -> StockKey {
        StockKey::new(self.to, self.item_id)
    }
}

/// Both sides of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Shared by the two ledger entries.
    pub correlation_id: CorrelationId,
    pub source: StockRecord,
    pub destination: StockRecord,
}

impl<S: StockStore> MutationCoordinator<S> {
    /// Moves stock between two warehouses.
    #[tracing::instrument(skip(self), fields(correlation_id))]
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome> {
        if request.amount <= 0 {
            return Err(InventoryError::InvalidAmount {
                mode: MutationMode::Subtract,
                amount: request.amount,
            });
        }
        if request.from == request.to {
            return Err(InventoryError::SameWarehouse(request.from));
        }

        let source = request.source();
        let destination = request.destination();

        let available = self.store().get(source).await?;
        if available < request.amount {
            return Err(InventoryError::InsufficientStock {
                key: source,
                requested: request.amount,
                available,
            });
        }

        let correlation_id = CorrelationId::new();
        tracing::Span::current().record("correlation_id", tracing::field::display(correlation_id));
        metrics::counter!("inventory_transfers_total").increment(1);
        let started = Instant::now();

        let outgoing = self
            .apply_validated(
                source,
                MutationMode::Subtract,
                request.amount,
                format!("transfer to warehouse {}", request.to),
                request.actor_id,
                Some(correlation_id),
            )
            .await
            .map_err(|e| match e {
                // Another writer drained the source between the check and the write.
                InventoryError::InvalidQuantity { current, .. } => {
                    InventoryError::InsufficientStock {
                        key: source,
                        requested: request.amount,
                        available: current,
                    }
                }
                other => other,
            })?;

        let incoming = self
            .apply_validated(
                destination,
                MutationMode::Add,
                request.amount,
                format!("transfer from warehouse {}", request.from),
                request.actor_id,
                Some(correlation_id),
            )
            .await;

        match incoming {
            Ok(incoming) => {
                metrics::histogram!("inventory_transfer_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    %correlation_id,
                    from = %request.from,
                    to = %request.to,
                    item_id = %request.item_id,
                    amount = request.amount,
                    "transfer completed"
                );
                Ok(TransferOutcome {
                    correlation_id,
                    source: outgoing.record,
                    destination: incoming.record,
                })
            }
            // The destination quantity did change; undoing the source would
            // create stock out of nothing.
            Err(partial @ InventoryError::PartialMutation { .. }) => Err(partial),
            Err(failure) => {
                tracing::warn!(
                    %correlation_id,
                    error = %failure,
                    "destination leg failed, compensating source"
                );
                let compensated = self.compensate(&request, correlation_id).await;
                metrics::counter!("inventory_transfers_failed_total").increment(1);

                Err(InventoryError::TransferFailed {
                    correlation_id,
                    from: request.from,
                    to: request.to,
                    item_id: request.item_id,
                    amount: request.amount,
                    reason: failure.to_string(),
                    compensated,
                })
            }
        }
    }

    /// Adds the transferred amount back to the source. Returns whether it
    /// committed.
    async fn compensate(&self, request: &TransferRequest, correlation_id: CorrelationId) -> bool {
        metrics::counter!("inventory_transfer_compensations_total").increment(1);

        let result = self
            .apply_validated(
                request.source(),
                MutationMode::Add,
                request.amount,
                COMPENSATION_REASON.to_string(),
                request.actor_id,
                Some(correlation_id),
            )
            .await;

        match result {
            Ok(outcome) => {
                tracing::info!(
                    %correlation_id,
                    restored = outcome.record.quantity,
                    "source restored"
                );
                true
            }
            Err(e) => {
                metrics::counter!("inventory_transfer_compensations_failed_total").increment(1);
                tracing::error!(
                    %correlation_id,
                    key = %request.source(),
                    amount = request.amount,
                    error = %e,
                    "compensation failed, source needs manual correction"
                );
                false
            }
        }
    }
}

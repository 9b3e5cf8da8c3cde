//! Mutation coordinator for the inventory ledger.
//!
//! Every quantity change goes through [`MutationCoordinator`]:
//! - `apply_mutation` for set / add / subtract adjustments, with optimistic
//!   concurrency (compare-and-set plus bounded retries)
//! - `transfer` for paired subtract/add legs across warehouses, compensating
//!   the source when the destination leg fails
//! - `reconcile` for repairing a key after a partial mutation

pub mod coordinator;
pub mod error;
pub mod mutation;
pub mod reconcile;
pub mod transfer;

pub use coordinator::{DEFAULT_MAX_ATTEMPTS, MutationCoordinator};
pub use error::{InventoryError, Result};
pub use mutation::{MutationMode, MutationOutcome, MutationRequest};
pub use reconcile::ReconcileOutcome;
pub use transfer::{TransferOutcome, TransferRequest};

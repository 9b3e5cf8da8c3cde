//! Mutation requests and their outcomes.

use common::{ActorId, CorrelationId, StockKey};
use ledger_store::{EntryId, StockRecord};
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// Reason recorded for additions that did not give one.
pub const DEFAULT_ADD_REASON: &str = "stock added";

/// How the requested amount is applied to the current quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationMode {
    /// `amount` is the new absolute quantity.
    Set,
    /// `amount` is added.
    Add,
    /// `amount` is taken away.
    Subtract,
}

impl MutationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationMode::Set => "set",
            MutationMode::Add => "add",
            MutationMode::Subtract => "subtract",
        }
    }

    /// Signed change this mode produces from `current`, or None on overflow.
    pub fn quantity_change(&self, current: i64, amount: i64) -> Option<i64> {
        match self {
            MutationMode::Set => amount.checked_sub(current),
            MutationMode::Add => Some(amount),
            MutationMode::Subtract => amount.checked_neg(),
        }
    }

    /// Whether the actor must say why (manual corrections and removals).
    pub fn requires_reason(&self) -> bool {
        matches!(self, MutationMode::Set | MutationMode::Subtract)
    }
}

impl std::fmt::Display for MutationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested change to one stock record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub key: StockKey,
    pub mode: MutationMode,
    pub amount: i64,
    pub reason: Option<String>,
    pub actor_id: ActorId,
    /// Set by the transfer workflow on both legs.
    pub correlation_id: Option<CorrelationId>,
}

impl MutationRequest {
    pub fn new(key: StockKey, mode: MutationMode, amount: i64, actor_id: ActorId) -> Self {
        Self {
            key,
            mode,
            amount,
            reason: None,
            actor_id,
            correlation_id: None,
        }
    }

    pub fn set(key: StockKey, quantity: i64, actor_id: ActorId) -> Self {
        Self::new(key, MutationMode::Set, quantity, actor_id)
    }

    pub fn add(key: StockKey, amount: i64, actor_id: ActorId) -> Self {
        Self::new(key, MutationMode::Add, amount, actor_id)
    }

    pub fn subtract(key: StockKey, amount: i64, actor_id: ActorId) -> Self {
        Self::new(key, MutationMode::Subtract, amount, actor_id)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Checks the request shape and returns the reason to record.
    ///
    /// Does not look at stored state; negative results are caught later
    /// against the current quantity.
    pub fn validate(&self) -> Result<String> {
        if self.mode != MutationMode::Set && self.amount <= 0 {
            return Err(InventoryError::InvalidAmount {
                mode: self.mode,
                amount: self.amount,
            });
        }

        let reason = self
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        match reason {
            Some(reason) => Ok(reason.to_string()),
            None if self.mode.requires_reason() => Err(InventoryError::ReasonRequired {
                key: self.key,
                mode: self.mode,
            }),
            None => Ok(DEFAULT_ADD_REASON.to_string()),
        }
    }
}

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// The stock record after the change.
    pub record: StockRecord,

    /// Signed change that was applied.
    pub quantity_change: i64,

    /// Ledger entry written for the change; None when the change was zero.
    pub entry_id: Option<EntryId>,

    /// Number of read-compute-write cycles it took.
    pub attempts: u32,
}

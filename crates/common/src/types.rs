use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a numeric identifier newtype backed by the catalog's `i64` keys.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates the identifier from a raw value.
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of a warehouse holding stock.
    WarehouseId
);

numeric_id!(
    /// Identifier of a catalog item (a spice blend, a pack size, ...).
    ItemId
);

numeric_id!(
    /// Identifier of the user performing a change.
    ActorId
);

/// Ties together the ledger entries written by a single transfer.
///
/// Wraps a UUID so it cannot be confused with numeric catalog keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a correlation ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Composite key of a stock record: one item in one warehouse.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
}

impl StockKey {
    pub fn new(warehouse_id: impl Into<WarehouseId>, item_id: impl Into<ItemId>) -> Self {
        Self {
            warehouse_id: warehouse_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "warehouse {} / item {}", self.warehouse_id, self.item_id)
    }
}

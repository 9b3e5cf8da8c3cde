pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{ActorId, CorrelationId, ItemId, StockKey, WarehouseId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use query::LedgerQuery;
pub use record::{EntryId, LedgerEntry, NewLedgerEntry, NewLedgerEntryBuilder, StockRecord};
pub use store::{
    CasOutcome, CommitOutcome, LedgerStream, LedgerWriter, QuantityStore, ReplaySnapshot, StockStore,
};

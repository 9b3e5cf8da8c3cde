//! Read side of the inventory ledger.
//!
//! - [`QueryFacade`] answers current-stock, low-stock and history reads
//!   without side effects
//! - [`ItemCatalog`] supplies item names and prices to join onto stock rows

pub mod catalog;
pub mod error;
pub mod facade;

pub use catalog::{InMemoryItemCatalog, ItemCatalog, ItemInfo, PostgresItemCatalog};
pub use error::{QueryError, Result};
pub use facade::{HistoryPage, HistoryRequest, QueryFacade, StockView};

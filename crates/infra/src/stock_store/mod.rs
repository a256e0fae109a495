//! Stock store boundary.
//!
//! Persistence for materials, the stock ledger, and the purchase and catalog
//! rows that reference materials, without storage assumptions. Services in
//! this crate only ever talk to [`StockStore`].

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use r#trait::{
    ComponentLink, HardDeleteCounts, PurchaseItem, StockStore, StoreError, WillBeDeleted,
    WillBeModified, WillBePreserved,
};

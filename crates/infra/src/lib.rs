//! Infrastructure layer: stock store backends, ledger services, config.

pub mod config;
pub mod error;
pub mod hard_delete;
pub mod job_lifecycle;
mod notify;
pub mod posting;
pub mod reversal;
pub mod stock_store;


pub use config::LedgerConfig;
pub use error::{LedgerError, WriteContext};
pub use hard_delete::{HardDeletePreview, HardDeleteService, HardDeleteSummary};
pub use job_lifecycle::{InMemoryJobRepository, JobEdit, JobLifecycle, JobRepository};
pub use posting::{BalanceCheck, PostingService};
pub use reversal::{ReversalReport, ReversalService};
pub use stock_store::{InMemoryStockStore, PostgresStockStore, StockStore, StoreError};

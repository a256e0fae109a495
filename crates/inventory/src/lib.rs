//! Inventory domain module: material masters and the stock ledger.
//!
//! This crate contains the record types and pure rules for stock movements,
//! implemented as deterministic domain logic (no IO, no storage).

pub mod events;
pub mod ledger;
pub mod material;
pub mod restoration;

pub use events::StockEvent;
pub use ledger::{EntryMetadata, LedgerEntry, ReversalTarget, StockMovement, TransactionType};
pub use material::{Material, NewMaterial};
pub use restoration::{
    ReversalPlan, Restoration, RestorationKey, SkipCause, SkippedRestoration, plan_reversal,
};

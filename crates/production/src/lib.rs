//! Production module: order components, job cards and the consumption calculator.
//!
//! Pure domain logic only: no IO, no logging, no persistence concerns.

pub mod calculator;
pub mod component;
pub mod formula;
pub mod job;
pub mod quantity;

pub use calculator::{CostedComponent, Recalculation, SkipReason, SkippedComponent, recalculate};
pub use component::{Component, ComponentRecord, ComponentType, ConsumptionBasis, ManualAnchor};
pub use formula::{ConsumptionFormula, FormulaError};
pub use job::Job;
pub use quantity::{OrderQuantity, QuantityRejected};

//! Geometry-driven consumption formulas for calculated components.
//!
//! Dimensions are in centimetres. Each formula already accounts for the order
//! quantity and the unit the material is stocked in, so the calculator never
//! scales its result again.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quantity::OrderQuantity;

const CM_PER_METRE: Decimal = Decimal::ONE_HUNDRED;
const SQ_CM_PER_SQ_METRE: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
const GRAMS_PER_KG: Decimal = Decimal::ONE_THOUSAND;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: Decimal },

    #[error("roll width {roll_width} is narrower than cut width {cut_width}")]
    RollTooNarrow { roll_width: Decimal, cut_width: Decimal },

    #[error("consumption overflowed")]
    Overflow,
}

/// How a calculated component derives its material requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsumptionFormula {
    /// Metres of roll stock. Pieces are nested side by side across the roll,
    /// and each row of pieces uses `cut_length` of roll.
    RollLength {
        cut_length: Decimal,
        cut_width: Decimal,
        roll_width: Decimal,
    },
    /// Square metres of sheet stock.
    Area { length: Decimal, width: Decimal },
    /// Kilograms of fabric at a given grammage (grams per square metre).
    Weight {
        length: Decimal,
        width: Decimal,
        gsm: Decimal,
    },
    /// A fixed count of pieces per bag (handles, zips, labels).
    PerPiece { pieces: Decimal },
}

impl ConsumptionFormula {
    /// Material required for `order_quantity` bags, in the material's stock unit.
    pub fn evaluate(&self, order_quantity: OrderQuantity) -> Result<Decimal, FormulaError> {
        let qty = order_quantity.value();
        match *self {
            ConsumptionFormula::RollLength {
                cut_length,
                cut_width,
                roll_width,
            } => {
                positive("cut_length", cut_length)?;
                positive("cut_width", cut_width)?;
                positive("roll_width", roll_width)?;

                let across = roll_width
                    .checked_div(cut_width)
                    .ok_or(FormulaError::Overflow)?
                    .floor();
                if across < Decimal::ONE {
                    return Err(FormulaError::RollTooNarrow {
                        roll_width,
                        cut_width,
                    });
                }
                let rows = (qty / across).ceil();
                rows.checked_mul(cut_length)
                    .map(|cm| cm / CM_PER_METRE)
                    .ok_or(FormulaError::Overflow)
            }
            ConsumptionFormula::Area { length, width } => {
                positive("length", length)?;
                positive("width", width)?;
                area_sq_metres(qty, length, width)
            }
            ConsumptionFormula::Weight { length, width, gsm } => {
                positive("length", length)?;
                positive("width", width)?;
                positive("gsm", gsm)?;
                let area = area_sq_metres(qty, length, width)?;
                area.checked_mul(gsm)
                    .map(|grams| grams / GRAMS_PER_KG)
                    .ok_or(FormulaError::Overflow)
            }
            ConsumptionFormula::PerPiece { pieces } => {
                positive("pieces", pieces)?;
                qty.checked_mul(pieces).ok_or(FormulaError::Overflow)
            }
        }
    }
}

fn positive(field: &'static str, value: Decimal) -> Result<(), FormulaError> {
    if value <= Decimal::ZERO {
        return Err(FormulaError::NonPositive { field, value });
    }
    Ok(())
}

fn area_sq_metres(qty: Decimal, length: Decimal, width: Decimal) -> Result<Decimal, FormulaError> {
    length
        .checked_mul(width)
        .and_then(|sq_cm| sq_cm.checked_mul(qty))
        .map(|sq_cm| sq_cm / SQ_CM_PER_SQ_METRE)
        .ok_or(FormulaError::Overflow)
}

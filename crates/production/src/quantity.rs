use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an order quantity input was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityRejected {
    #[error("order quantity is not a number: {0:?}")]
    NotNumeric(String),

    #[error("order quantity is not finite")]
    NotFinite,

    #[error("order quantity must be positive, got {0}")]
    NotPositive(Decimal),
}

/// A validated order quantity: a positive, finite number of bags.
///
/// Fractional quantities are allowed (orders are sometimes booked in
/// thousands or kilograms).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct OrderQuantity(Decimal);

impl OrderQuantity {
    pub fn new(value: Decimal) -> Result<Self, QuantityRejected> {
        if value <= Decimal::ZERO {
            return Err(QuantityRejected::NotPositive(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl From<core::convert::Infallible> for QuantityRejected {
    fn from(never: core::convert::Infallible) -> Self {
        match never {}
    }
}

impl TryFrom<Decimal> for OrderQuantity {
    type Error = QuantityRejected;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<f64> for OrderQuantity {
    type Error = QuantityRejected;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(QuantityRejected::NotFinite);
        }
        let decimal = Decimal::try_from(value).map_err(|_| QuantityRejected::NotFinite)?;
        Self::new(decimal)
    }
}

impl TryFrom<u32> for OrderQuantity {
    type Error = QuantityRejected;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(Decimal::from(value))
    }
}

impl TryFrom<&str> for OrderQuantity {
    type Error = QuantityRejected;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let decimal = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| QuantityRejected::NotNumeric(value.to_string()))?;
        Self::new(decimal)
    }
}

impl From<OrderQuantity> for Decimal {
    fn from(value: OrderQuantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for OrderQuantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

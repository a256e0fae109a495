use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bagforge_core::{DomainError, DomainResult, LedgerEntryId, MaterialId, Versioned};

use crate::ledger::{LedgerEntry, StockMovement};

/// Raw material master with its current stock.
///
/// Stock only changes through [`Material::apply`], which always yields the
/// ledger entry recording the change. Quantity may go negative: that signals
/// over-consumption and is not rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    id: MaterialId,
    name: String,
    unit: String,
    quantity: Decimal,
    rate: Decimal,
    version: u64,
}

/// Input for onboarding a material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMaterial {
    pub id: MaterialId,
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub opening_quantity: Decimal,
    #[serde(default)]
    pub rate: Decimal,
}

impl NewMaterial {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: MaterialId::new(),
            name: name.into(),
            unit: unit.into(),
            opening_quantity: Decimal::ZERO,
            rate: Decimal::ZERO,
        }
    }

    pub fn with_opening_quantity(mut self, quantity: Decimal) -> Self {
        self.opening_quantity = quantity;
        self
    }

    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.rate = rate;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("material name cannot be empty"));
        }
        if self.unit.trim().is_empty() {
            return Err(DomainError::validation("material unit cannot be empty"));
        }
        if self.rate < Decimal::ZERO {
            return Err(DomainError::validation("material rate cannot be negative"));
        }
        Ok(())
    }

    /// Material row at zero stock; the opening balance is posted separately
    /// so the ledger accounts for it.
    pub fn into_material(self) -> Material {
        Material {
            id: self.id,
            name: self.name.trim().to_string(),
            unit: self.unit.trim().to_string(),
            quantity: Decimal::ZERO,
            rate: self.rate,
            version: 0,
        }
    }

    /// Ledger movement for a non-zero opening balance.
    pub fn opening_movement(&self) -> Option<StockMovement> {
        (!self.opening_quantity.is_zero())
            .then(|| StockMovement::opening(self.id, self.opening_quantity))
    }
}

impl Material {
    /// Rehydrate a row loaded from storage.
    pub fn restore(
        id: MaterialId,
        name: String,
        unit: String,
        quantity: Decimal,
        rate: Decimal,
        version: u64,
    ) -> Self {
        Self {
            id,
            name,
            unit,
            quantity,
            rate,
            version,
        }
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Apply a validated movement and produce its ledger entry.
    ///
    /// Must run inside the store's critical section: the entry's previous and
    /// new quantities are taken from this row, not from an earlier read.
    pub fn apply(
        &mut self,
        movement: StockMovement,
        entry_id: LedgerEntryId,
        sequence: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<LedgerEntry> {
        if movement.material_id != self.id {
            return Err(DomainError::invariant(format!(
                "movement for material {} applied to {}",
                movement.material_id, self.id
            )));
        }
        movement.validate()?;
        movement.expected_version.check(self.version)?;

        let previous_quantity = self.quantity;
        let new_quantity = previous_quantity
            .checked_add(movement.delta)
            .ok_or_else(|| DomainError::invariant("stock quantity overflowed"))?;

        self.quantity = new_quantity;
        self.version += 1;

        Ok(movement.into_entry(entry_id, sequence, &self.unit, previous_quantity, new_quantity, at))
    }
}

impl Versioned for Material {
    fn version(&self) -> u64 {
        self.version
    }
}

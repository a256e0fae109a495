use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bagforge_core::{ComponentId, DomainError, DomainResult, MaterialId, OrderId};

use crate::formula::ConsumptionFormula;

/// Production stage a component belongs to ("cutting", "printing", ...).
///
/// Normalised to trimmed lowercase so ledger lookups by type are stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ComponentType(String);

impl ComponentType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ComponentType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for ComponentType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<ComponentType> for String {
    fn from(value: ComponentType) -> Self {
        value.0
    }
}

impl core::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-bag consumption captured once for a manual component.
///
/// Immutable once captured. Rescaling multiplies this anchor, never the
/// current consumption.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ManualAnchor(Decimal);

impl ManualAnchor {
    fn capture(per_unit: Decimal) -> DomainResult<Self> {
        if per_unit < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "base consumption cannot be negative, got {per_unit}"
            )));
        }
        Ok(Self(per_unit))
    }

    pub fn per_unit(self) -> Decimal {
        self.0
    }
}

/// Where a component's consumption comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum ConsumptionBasis {
    /// Entered by hand per bag; `None` until a per-unit value is captured.
    Manual { anchor: Option<ManualAnchor> },
    /// Derived from geometry.
    Calculated { formula: ConsumptionFormula },
}

/// One material usage line of an order (and of the job cards made from it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    id: ComponentId,
    order_id: OrderId,
    component_type: ComponentType,
    material_id: Option<MaterialId>,
    consumption: Option<Decimal>,
    basis: ConsumptionBasis,
}

/// Component as delivered by the order/catalog collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: ComponentId,
    pub order_id: OrderId,
    pub component_type: ComponentType,
    #[serde(default)]
    pub material_id: Option<MaterialId>,
    #[serde(default)]
    pub consumption: Option<Decimal>,
    pub is_manual: bool,
    #[serde(default)]
    pub formula: Option<ConsumptionFormula>,
    #[serde(default)]
    pub base_consumption: Option<Decimal>,
}

impl Component {
    /// New manual component anchored at `per_unit` and sized for `order_quantity`.
    pub fn manual(
        id: ComponentId,
        order_id: OrderId,
        component_type: impl Into<ComponentType>,
        material_id: Option<MaterialId>,
        per_unit: Decimal,
        order_quantity: crate::OrderQuantity,
    ) -> DomainResult<Self> {
        let anchor = ManualAnchor::capture(per_unit)?;
        let consumption = anchor
            .per_unit()
            .checked_mul(order_quantity.value())
            .ok_or_else(|| DomainError::validation("consumption overflowed"))?;
        Ok(Self {
            id,
            order_id,
            component_type: component_type.into(),
            material_id,
            consumption: Some(consumption),
            basis: ConsumptionBasis::Manual {
                anchor: Some(anchor),
            },
        })
    }

    /// New formula-driven component. Its consumption is unset until the first
    /// recalculation.
    pub fn calculated(
        id: ComponentId,
        order_id: OrderId,
        component_type: impl Into<ComponentType>,
        material_id: Option<MaterialId>,
        formula: ConsumptionFormula,
    ) -> Self {
        Self {
            id,
            order_id,
            component_type: component_type.into(),
            material_id,
            consumption: None,
            basis: ConsumptionBasis::Calculated { formula },
        }
    }

    /// Build from a collaborator record.
    ///
    /// A manual record that carries no `base_consumption` adopts its fetched
    /// `consumption` as the per-unit anchor, once, at this point.
    pub fn from_record(record: ComponentRecord) -> DomainResult<Self> {
        let basis = if record.is_manual {
            let anchor = record
                .base_consumption
                .or(record.consumption)
                .map(ManualAnchor::capture)
                .transpose()?;
            ConsumptionBasis::Manual { anchor }
        } else {
            let formula = record.formula.ok_or_else(|| {
                DomainError::validation(format!(
                    "calculated component {} has no formula",
                    record.id
                ))
            })?;
            ConsumptionBasis::Calculated { formula }
        };

        Ok(Self {
            id: record.id,
            order_id: record.order_id,
            component_type: record.component_type,
            material_id: record.material_id,
            consumption: record.consumption,
            basis,
        })
    }

    /// Back to the collaborator shape (anchor exported as `base_consumption`).
    pub fn to_record(&self) -> ComponentRecord {
        let (is_manual, formula, base_consumption) = match &self.basis {
            ConsumptionBasis::Manual { anchor } => (true, None, anchor.map(ManualAnchor::per_unit)),
            ConsumptionBasis::Calculated { formula } => (false, Some(formula.clone()), None),
        };
        ComponentRecord {
            id: self.id,
            order_id: self.order_id,
            component_type: self.component_type.clone(),
            material_id: self.material_id,
            consumption: self.consumption,
            is_manual,
            formula,
            base_consumption,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn component_type(&self) -> &ComponentType {
        &self.component_type
    }

    pub fn material_id(&self) -> Option<MaterialId> {
        self.material_id
    }

    pub fn consumption(&self) -> Option<Decimal> {
        self.consumption
    }

    pub fn basis(&self) -> &ConsumptionBasis {
        &self.basis
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.basis, ConsumptionBasis::Manual { .. })
    }

    /// The write-once per-unit value, for manual components that have one.
    pub fn base_consumption(&self) -> Option<Decimal> {
        match self.basis {
            ConsumptionBasis::Manual { anchor } => anchor.map(ManualAnchor::per_unit),
            ConsumptionBasis::Calculated { .. } => None,
        }
    }

    /// Capture the per-unit anchor of a manual component that has none yet.
    pub fn capture_anchor(&mut self, per_unit: Decimal) -> DomainResult<()> {
        match &mut self.basis {
            ConsumptionBasis::Manual { anchor: Some(_) } => Err(DomainError::invariant(format!(
                "component {} already has a base consumption",
                self.id
            ))),
            ConsumptionBasis::Manual { anchor } => {
                *anchor = Some(ManualAnchor::capture(per_unit)?);
                Ok(())
            }
            ConsumptionBasis::Calculated { .. } => Err(DomainError::validation(format!(
                "component {} is calculated and has no base consumption",
                self.id
            ))),
        }
    }

    pub(crate) fn with_consumption(&self, consumption: Decimal) -> Self {
        Self {
            consumption: Some(consumption),
            ..self.clone()
        }
    }
}

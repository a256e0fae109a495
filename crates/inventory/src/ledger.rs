use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bagforge_core::{
    ComponentId, DomainError, DomainResult, ExpectedVersion, JobId, LedgerEntryId, MaterialId,
    OrderId,
};
use bagforge_production::ComponentType;

/// Why stock changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "consumption")]
    Consumption,
    #[serde(rename = "job-card-reversal")]
    JobCardReversal,
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "purchase")]
    Purchase,
    #[serde(rename = "opening")]
    Opening,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Consumption => "consumption",
            TransactionType::JobCardReversal => "job-card-reversal",
            TransactionType::Manual => "manual",
            TransactionType::Purchase => "purchase",
            TransactionType::Opening => "opening",
        }
    }

    /// Consumption history survives a hard delete of its material.
    pub fn is_consumption(self) -> bool {
        matches!(self, TransactionType::Consumption)
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumption" => Ok(TransactionType::Consumption),
            "job-card-reversal" => Ok(TransactionType::JobCardReversal),
            "manual" => Ok(TransactionType::Manual),
            "purchase" => Ok(TransactionType::Purchase),
            "opening" => Ok(TransactionType::Opening),
            other => Err(DomainError::validation(format!(
                "unknown transaction type '{other}'"
            ))),
        }
    }
}

/// Structured provenance of a ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<ComponentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<ComponentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Reversals only: whether the original consumption was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<bool>,
    /// Exact reversals only: the consumption entry being undone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverses_entry_id: Option<LedgerEntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Immutable, append-only record of one signed stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    /// Store-wide commit order.
    pub sequence: u64,
    pub material_id: MaterialId,
    /// Signed change: negative for consumption, positive for restorations and receipts.
    pub quantity: Decimal,
    pub transaction_type: TransactionType,
    /// Job id for consumption and reversal entries.
    pub reference_id: Option<Uuid>,
    pub reference_number: Option<String>,
    pub metadata: EntryMetadata,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn references_job(&self, job_id: JobId) -> bool {
        self.reference_id == Some(*job_id.as_uuid())
    }

    pub fn reversal_target(&self) -> Option<ReversalTarget> {
        ReversalTarget::of(
            self.transaction_type,
            self.reference_id,
            self.material_id,
            &self.metadata,
        )
    }
}

/// What a reversal entry undoes. The ledger holds at most one reversal per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReversalTarget {
    /// An exact restoration of one consumption entry.
    Entry(LedgerEntryId),
    /// A fallback restoration of a component that had no consumption entry.
    Fallback {
        job: Uuid,
        material_id: MaterialId,
        component_id: Option<ComponentId>,
    },
}

impl ReversalTarget {
    fn of(
        transaction_type: TransactionType,
        reference_id: Option<Uuid>,
        material_id: MaterialId,
        metadata: &EntryMetadata,
    ) -> Option<Self> {
        if transaction_type != TransactionType::JobCardReversal {
            return None;
        }
        Some(match metadata.reverses_entry_id {
            Some(id) => Self::Entry(id),
            None => Self::Fallback {
                job: reference_id?,
                material_id,
                component_id: metadata.component_id,
            },
        })
    }
}

impl core::fmt::Display for ReversalTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Entry(id) => write!(f, "ledger entry {id}"),
            Self::Fallback {
                job,
                material_id,
                component_id: Some(component_id),
            } => write!(f, "component {component_id} of job {job} on material {material_id}"),
            Self::Fallback {
                job, material_id, ..
            } => write!(f, "job {job} on material {material_id}"),
        }
    }
}

/// A stock change waiting to be committed.
///
/// Stores turn movements into [`LedgerEntry`] rows via
/// [`crate::Material::apply`], one batch at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub material_id: MaterialId,
    pub delta: Decimal,
    pub transaction_type: TransactionType,
    pub reference_id: Option<Uuid>,
    pub reference_number: Option<String>,
    pub metadata: EntryMetadata,
    /// Compare-and-swap guard on the material row. Atomic deltas use `Any`.
    pub expected_version: ExpectedVersion,
}

impl StockMovement {
    fn new(material_id: MaterialId, delta: Decimal, transaction_type: TransactionType) -> Self {
        Self {
            material_id,
            delta,
            transaction_type,
            reference_id: None,
            reference_number: None,
            metadata: EntryMetadata::default(),
            expected_version: ExpectedVersion::Any,
        }
    }

    /// Draw `quantity` of material for a job component.
    pub fn consumption(
        material_id: MaterialId,
        component_id: ComponentId,
        component_type: ComponentType,
        quantity: Decimal,
        order_id: OrderId,
        job_id: JobId,
    ) -> Self {
        let mut m = Self::new(material_id, -quantity, TransactionType::Consumption);
        m.reference_id = Some(job_id.into());
        m.metadata = EntryMetadata {
            component_id: Some(component_id),
            component_type: Some(component_type),
            order_id: Some(order_id),
            job_id: Some(job_id),
            ..EntryMetadata::default()
        };
        m
    }

    /// Put back `amount` previously drawn by a job component.
    ///
    /// `reverses` names the consumption entry when it was found (exact
    /// restoration); `None` marks a best-effort fallback.
    pub fn reversal(
        material_id: MaterialId,
        amount: Decimal,
        job_id: JobId,
        component_id: Option<ComponentId>,
        component_type: Option<ComponentType>,
        reverses: Option<LedgerEntryId>,
    ) -> Self {
        let mut m = Self::new(material_id, amount, TransactionType::JobCardReversal);
        m.reference_id = Some(job_id.into());
        m.metadata = EntryMetadata {
            component_id,
            component_type,
            job_id: Some(job_id),
            exact: Some(reverses.is_some()),
            reverses_entry_id: reverses,
            ..EntryMetadata::default()
        };
        m
    }

    pub fn reversal_target(&self) -> Option<ReversalTarget> {
        ReversalTarget::of(
            self.transaction_type,
            self.reference_id,
            self.material_id,
            &self.metadata,
        )
    }

    pub fn purchase(material_id: MaterialId, quantity: Decimal) -> Self {
        Self::new(material_id, quantity, TransactionType::Purchase)
    }

    pub fn manual(material_id: MaterialId, delta: Decimal, note: impl Into<String>) -> Self {
        let mut m = Self::new(material_id, delta, TransactionType::Manual);
        m.metadata.note = Some(note.into());
        m
    }

    pub fn opening(material_id: MaterialId, quantity: Decimal) -> Self {
        Self::new(material_id, quantity, TransactionType::Opening)
    }

    pub fn with_reference_number(mut self, number: impl Into<String>) -> Self {
        self.reference_number = Some(number.into());
        self
    }

    pub fn expecting(mut self, expected_version: ExpectedVersion) -> Self {
        self.expected_version = expected_version;
        self
    }

    /// Sign and provenance rules per transaction type.
    pub fn validate(&self) -> DomainResult<()> {
        if self.delta.is_zero() {
            return Err(DomainError::validation(format!(
                "{} movement for material {} has zero quantity",
                self.transaction_type, self.material_id
            )));
        }
        match self.transaction_type {
            TransactionType::Consumption => {
                if self.delta.is_sign_positive() {
                    return Err(DomainError::validation("consumption must decrease stock"));
                }
                if self.metadata.component_id.is_none() {
                    return Err(DomainError::validation(
                        "consumption must name the component that drew the stock",
                    ));
                }
            }
            TransactionType::JobCardReversal | TransactionType::Purchase => {
                if self.delta.is_sign_negative() {
                    return Err(DomainError::validation(format!(
                        "{} must increase stock",
                        self.transaction_type
                    )));
                }
            }
            TransactionType::Manual | TransactionType::Opening => {}
        }
        Ok(())
    }

    /// Record this movement as committed against a row that went from
    /// `previous_quantity` to `new_quantity`.
    pub fn into_entry(
        mut self,
        id: LedgerEntryId,
        sequence: u64,
        unit: &str,
        previous_quantity: Decimal,
        new_quantity: Decimal,
        at: DateTime<Utc>,
    ) -> LedgerEntry {
        if self.metadata.unit.is_none() {
            self.metadata.unit = Some(unit.to_string());
        }
        LedgerEntry {
            id,
            sequence,
            material_id: self.material_id,
            quantity: self.delta,
            transaction_type: self.transaction_type,
            reference_id: self.reference_id,
            reference_number: self.reference_number,
            metadata: self.metadata,
            previous_quantity,
            new_quantity,
            created_at: at,
        }
    }
}

use thiserror::Error;
use uuid::Uuid;

use bagforge_core::{ComponentId, DomainError, JobId, MaterialId};

use crate::stock_store::StoreError;

/// What was being attempted when a ledger operation failed.
///
/// Carries the ids an operator needs to reconcile by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteContext {
    pub operation: &'static str,
    pub material_id: Option<MaterialId>,
    pub job_id: Option<JobId>,
    pub component_id: Option<ComponentId>,
}

impl WriteContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }

    pub fn material(mut self, material_id: MaterialId) -> Self {
        self.material_id = Some(material_id);
        self
    }

    pub fn job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn component(mut self, component_id: ComponentId) -> Self {
        self.component_id = Some(component_id);
        self
    }
}

impl core::fmt::Display for WriteContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.operation)?;
        if let Some(id) = self.material_id {
            write!(f, " material={id}")?;
        }
        if let Some(id) = self.job_id {
            write!(f, " job={id}")?;
        }
        if let Some(id) = self.component_id {
            write!(f, " component={id}")?;
        }
        Ok(())
    }
}

/// Errors surfaced by posting, reversal, hard delete and the job lifecycle.
///
/// A reversal that had to fall back to present-day consumption is not an
/// error; see `ReversalReport::is_partial`.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("invalid quantity: {reason}")]
    InvalidQuantity {
        reason: String,
        material_id: Option<MaterialId>,
        component_id: Option<ComponentId>,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("write failed ({context}): {source}")]
    WriteFailure {
        context: WriteContext,
        #[source]
        source: StoreError,
    },

    #[error("conflict: {0}")]
    Conflict(String),
}

impl LedgerError {
    pub fn material_not_found(id: MaterialId) -> Self {
        LedgerError::NotFound {
            kind: "material",
            id: id.into(),
        }
    }

    pub fn job_not_found(id: JobId) -> Self {
        LedgerError::NotFound {
            kind: "job",
            id: id.into(),
        }
    }

    pub fn invalid_quantity(reason: impl Into<String>, context: &WriteContext) -> Self {
        LedgerError::InvalidQuantity {
            reason: reason.into(),
            material_id: context.material_id,
            component_id: context.component_id,
        }
    }

    /// Classify a store failure, keeping `context` for the ones that need it.
    pub fn store(context: WriteContext, err: StoreError) -> Self {
        match err {
            StoreError::MaterialNotFound(id) => LedgerError::material_not_found(id),
            StoreError::InvalidMovement {
                material_id,
                reason,
            } => LedgerError::InvalidQuantity {
                reason,
                material_id: Some(material_id),
                component_id: context.component_id,
            },
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            source @ StoreError::Storage(_) => LedgerError::WriteFailure { context, source },
        }
    }
}

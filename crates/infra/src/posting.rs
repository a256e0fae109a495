//! Posting: recording stock changes against materials.
//!
//! ```text
//! request
//!   ↓
//! 1. Build StockMovement(s) (pure, validated)
//!   ↓
//! 2. StockStore::commit — atomic delta per row, one ledger entry per movement,
//!    whole batch or nothing
//!   ↓
//! 3. Publish StockChanged per committed entry
//! ```
//!
//! Nothing reads a quantity and writes it back: the store applies deltas
//! inside its critical section.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument};

use bagforge_core::{ComponentId, JobId, MaterialId, OrderId};
use bagforge_events::EventBus;
use bagforge_inventory::{LedgerEntry, Material, NewMaterial, StockEvent, StockMovement};
use bagforge_production::{ComponentType, Job};

use crate::error::{LedgerError, WriteContext};
use crate::notify;
use crate::stock_store::StockStore;

/// Result of reconciling a material's stock against its ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceCheck {
    pub material_id: MaterialId,
    pub recorded: Decimal,
    pub ledger_sum: Decimal,
    pub consistent: bool,
}

/// Consumption movements for every component of `job` that draws stock.
///
/// Components without a material, or without positive consumption, post
/// nothing.
pub fn consumption_movements(job: &Job) -> Vec<StockMovement> {
    job.material_components()
        .filter_map(|component| {
            let material_id = component.material_id()?;
            match component.consumption() {
                Some(quantity) if quantity > Decimal::ZERO => Some(StockMovement::consumption(
                    material_id,
                    component.id(),
                    component.component_type().clone(),
                    quantity,
                    job.order_id,
                    job.id,
                )),
                _ => {
                    debug!(job_id = %job.id, component_id = %component.id(), "component has no consumption to post");
                    None
                }
            }
        })
        .map(|m| m.with_reference_number(job.job_number.clone()))
        .collect()
}

/// Posts consumption, purchases, corrections and opening balances.
#[derive(Debug)]
pub struct PostingService<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PostingService<S, B>
where
    S: StockStore,
    B: EventBus<StockEvent>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Draw `quantity` of a material for one job component.
    ///
    /// Returns the material's new quantity, which may be negative.
    #[instrument(
        skip(self, component_type),
        fields(material_id = %material_id, component_id = %component_id, job_id = %job_id),
        err
    )]
    pub fn post_consumption(
        &self,
        material_id: MaterialId,
        component_id: ComponentId,
        component_type: ComponentType,
        quantity: Decimal,
        order_id: OrderId,
        job_id: JobId,
    ) -> Result<Decimal, LedgerError> {
        let context = WriteContext::new("post consumption")
            .material(material_id)
            .job(job_id)
            .component(component_id);
        if quantity <= Decimal::ZERO {
            return Err(LedgerError::invalid_quantity(
                format!("consumption must be positive, got {quantity}"),
                &context,
            ));
        }

        let movement = StockMovement::consumption(
            material_id,
            component_id,
            component_type,
            quantity,
            order_id,
            job_id,
        );
        let new_quantity = self.commit_one(movement, context)?.new_quantity;
        info!(%new_quantity, "consumption posted");
        Ok(new_quantity)
    }

    /// Post every consuming component of `job` as one atomic batch.
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    pub fn post_job_consumption(&self, job: &Job) -> Result<Vec<LedgerEntry>, LedgerError> {
        let movements = consumption_movements(job);
        if movements.is_empty() {
            return Ok(vec![]);
        }
        let entries = self
            .store
            .commit(movements)
            .map_err(|e| LedgerError::store(WriteContext::new("post job consumption").job(job.id), e))?;
        notify::publish_committed(&self.bus, &entries);
        info!(entries = entries.len(), "job consumption posted");
        Ok(entries)
    }

    /// Record received stock from a purchase.
    #[instrument(skip(self), fields(material_id = %material_id), err)]
    pub fn record_purchase(
        &self,
        material_id: MaterialId,
        quantity: Decimal,
        purchase_reference: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let context = WriteContext::new("record purchase").material(material_id);
        if quantity <= Decimal::ZERO {
            return Err(LedgerError::invalid_quantity(
                format!("purchased quantity must be positive, got {quantity}"),
                &context,
            ));
        }
        let movement =
            StockMovement::purchase(material_id, quantity).with_reference_number(purchase_reference);
        self.commit_one(movement, context)
    }

    /// Manual stock correction, logged like any other change.
    #[instrument(skip(self, note), fields(material_id = %material_id), err)]
    pub fn adjust_stock(
        &self,
        material_id: MaterialId,
        delta: Decimal,
        note: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let context = WriteContext::new("adjust stock").material(material_id);
        if delta.is_zero() {
            return Err(LedgerError::invalid_quantity("adjustment cannot be zero", &context));
        }
        self.commit_one(StockMovement::manual(material_id, delta, note), context)
    }

    /// Create a material; a non-zero opening stock is posted as an `opening` entry.
    #[instrument(skip(self, new), fields(material_id = %new.id), err)]
    pub fn onboard_material(&self, new: NewMaterial) -> Result<Material, LedgerError> {
        new.validate()?;
        let context = WriteContext::new("onboard material").material(new.id);
        let (material, opening) = self
            .store
            .onboard(new)
            .map_err(|e| LedgerError::store(context, e))?;
        if let Some(entry) = opening {
            notify::publish_committed(&self.bus, std::slice::from_ref(&entry));
        }
        info!(quantity = %material.quantity(), "material onboarded");
        Ok(material)
    }

    /// Compare the recorded quantity with the sum of the material's ledger.
    #[instrument(skip(self), fields(material_id = %material_id), err)]
    pub fn verify_balance(&self, material_id: MaterialId) -> Result<BalanceCheck, LedgerError> {
        let context = WriteContext::new("verify balance").material(material_id);
        let material = self
            .store
            .material(material_id)
            .map_err(|e| LedgerError::store(context.clone(), e))?
            .ok_or_else(|| LedgerError::material_not_found(material_id))?;
        let ledger_sum = self
            .store
            .entries_for_material(material_id)
            .map_err(|e| LedgerError::store(context.clone(), e))?
            .iter()
            .try_fold(Decimal::ZERO, |sum, e| sum.checked_add(e.quantity))
            .ok_or_else(|| LedgerError::invalid_quantity("ledger sum overflowed", &context))?;

        Ok(BalanceCheck {
            material_id,
            recorded: material.quantity(),
            ledger_sum,
            consistent: material.quantity() == ledger_sum,
        })
    }

    fn commit(
        &self,
        movement: StockMovement,
        context: WriteContext,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self
            .store
            .commit(vec![movement])
            .map_err(|e| LedgerError::store(context, e))?;
        notify::publish_committed(&self.bus, &entries);
        Ok(entries)
    }

    fn commit_one(
        &self,
        movement: StockMovement,
        context: WriteContext,
    ) -> Result<LedgerEntry, LedgerError> {
        let operation = context.operation;
        self.commit(movement, context.clone())?
            .pop()
            .ok_or_else(|| {
                LedgerError::store(
                    context,
                    crate::stock_store::StoreError::Storage(format!(
                        "{operation} committed no ledger entry"
                    )),
                )
            })
    }
}

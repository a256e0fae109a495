//! Reversal: undoing a job's consumption before the job goes away.
//!
//! Planning is pure (`bagforge_inventory::plan_reversal`); this service loads
//! the job's ledger entries, drops restorations against materials that no
//! longer exist, and commits the rest as one batch.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, instrument, warn};

use bagforge_core::{JobId, MaterialId};
use bagforge_events::EventBus;
use bagforge_inventory::{
    LedgerEntry, Restoration, ReversalPlan, SkippedRestoration, StockEvent, StockMovement,
    plan_reversal,
};
use bagforge_production::Job;

use crate::error::{LedgerError, WriteContext};
use crate::notify;
use crate::stock_store::{StockStore, StoreError};

/// Plans taken before giving up on a job that keeps being reversed underneath us.
const MAX_PLAN_ATTEMPTS: u32 = 3;

/// Outcome of reversing one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReversalReport {
    pub job_id: JobId,
    pub restorations: Vec<Restoration>,
    pub skipped: Vec<SkippedRestoration>,
    /// Compensating entries, in commit order.
    pub entries: Vec<LedgerEntry>,
}

impl ReversalReport {
    pub(crate) fn new(plan: ReversalPlan, entries: Vec<LedgerEntry>) -> Self {
        Self {
            job_id: plan.job_id,
            restorations: plan.restorations,
            skipped: plan.skipped,
            entries,
        }
    }

    /// Some component could only be restored from its present-day consumption.
    pub fn is_partial(&self) -> bool {
        self.restorations.iter().any(|r| !r.is_exact())
    }
}

#[derive(Debug)]
pub struct ReversalService<S, B> {
    store: S,
    bus: B,
}

impl<S, B> ReversalService<S, B>
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

    /// Work out what reversing `job` would restore, without writing.
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    pub fn plan(&self, job: &Job) -> Result<ReversalPlan, LedgerError> {
        let context = WriteContext::new("plan reversal").job(job.id);
        let entries = self
            .store
            .entries_for_reference(job.id.into())
            .map_err(|e| LedgerError::store(context.clone(), e))?;

        let mut plan = plan_reversal(job, &entries);

        let mut exists: HashMap<MaterialId, bool> = HashMap::new();
        for r in &plan.restorations {
            let material_id = r.material_id();
            if exists.contains_key(&material_id) {
                continue;
            }
            let found = self
                .store
                .material(material_id)
                .map_err(|e| LedgerError::store(context.clone().material(material_id), e))?
                .is_some();
            if !found {
                warn!(%material_id, "material no longer exists; its consumption cannot be restored");
            }
            exists.insert(material_id, found);
        }
        plan.retain_materials(|id| exists.get(&id).copied().unwrap_or(false));

        for r in plan.restorations.iter().filter(|r| !r.is_exact()) {
            warn!(
                material_id = %r.material_id(),
                component_id = ?r.component_id(),
                amount = %r.restored_amount(),
                "no consumption entry found; restoring current consumption"
            );
        }
        Ok(plan)
    }

    /// Restore everything `job` consumed, as one atomic batch.
    ///
    /// Re-running against an already reversed job restores nothing.
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    pub fn reverse_job_consumption(&self, job: &Job) -> Result<ReversalReport, LedgerError> {
        let (plan, entries) = self.commit_with(job, Vec::new(), "reverse job consumption")?;
        if entries.is_empty() {
            info!(skipped = plan.skipped.len(), "nothing to reverse");
            return Ok(ReversalReport::new(plan, entries));
        }

        let report = ReversalReport::new(plan, entries);
        info!(
            restored = report.restorations.len(),
            partial = report.is_partial(),
            "job consumption reversed"
        );
        Ok(report)
    }

    /// Plan `job`'s reversal and commit it in one batch ahead of `postings`.
    ///
    /// The store refuses a batch that reverses something already reversed.
    /// When another writer reversed the job after we planned, the plan is
    /// taken again from the ledger as it now stands.
    pub(crate) fn commit_with(
        &self,
        job: &Job,
        postings: Vec<StockMovement>,
        operation: &'static str,
    ) -> Result<(ReversalPlan, Vec<LedgerEntry>), LedgerError> {
        let mut attempt = 1;
        loop {
            let plan = self.plan(job)?;
            let mut movements = plan.movements.clone();
            movements.extend(postings.iter().cloned());
            if movements.is_empty() {
                return Ok((plan, Vec::new()));
            }

            match self.store.commit(movements) {
                Ok(entries) => {
                    notify::publish_committed(&self.bus, &entries);
                    return Ok((plan, entries));
                }
                Err(StoreError::Conflict(reason))
                    if !plan.is_empty() && attempt < MAX_PLAN_ATTEMPTS =>
                {
                    warn!(attempt, %reason, "job reversed concurrently; planning again");
                    attempt += 1;
                }
                Err(e) => return Err(LedgerError::store(WriteContext::new(operation).job(job.id), e)),
            }
        }
    }
}

//! Job deletion and editing, with stock kept in step.
//!
//! Reversal reads the job's components to find what each one drew, so the
//! job row must outlive its reversal: delete is always reverse, then delete.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{error, info, instrument};

use bagforge_core::JobId;
use bagforge_events::EventBus;
use bagforge_inventory::{LedgerEntry, StockEvent};
use bagforge_production::Job;

use crate::error::{LedgerError, WriteContext};
use crate::posting::consumption_movements;
use crate::reversal::{ReversalReport, ReversalService};
use crate::stock_store::{StockStore, StoreError};

/// Job records owned by the production collaborator.
pub trait JobRepository: Send + Sync {
    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    fn save(&self, job: Job) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    fn delete(&self, id: JobId) -> Result<bool, StoreError>;
}

impl<R> JobRepository for Arc<R>
where
    R: JobRepository + ?Sized,
{
    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).get(id)
    }

    fn save(&self, job: Job) -> Result<(), StoreError> {
        (**self).save(job)
    }

    fn delete(&self, id: JobId) -> Result<bool, StoreError> {
        (**self).delete(id)
    }
}

/// In-memory job repository (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(jobs.get(&id).cloned())
    }

    fn save(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        jobs.insert(job.id, job);
        Ok(())
    }

    fn delete(&self, id: JobId) -> Result<bool, StoreError> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(jobs.remove(&id).is_some())
    }
}

/// Result of editing a job: what was put back, then what was drawn again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEdit {
    pub reversal: ReversalReport,
    pub posted: Vec<LedgerEntry>,
}

pub struct JobLifecycle<S, B, R> {
    reversal: ReversalService<S, B>,
    jobs: R,
}

impl<S, B, R> JobLifecycle<S, B, R>
where
    S: StockStore,
    B: EventBus<StockEvent>,
    R: JobRepository,
{
    pub fn new(store: S, bus: B, jobs: R) -> Self {
        Self {
            reversal: ReversalService::new(store, bus),
            jobs,
        }
    }

    pub fn jobs(&self) -> &R {
        &self.jobs
    }

    fn load(&self, job_id: JobId) -> Result<Job, LedgerError> {
        self.jobs
            .get(job_id)
            .map_err(|e| LedgerError::store(WriteContext::new("load job").job(job_id), e))?
            .ok_or_else(|| LedgerError::job_not_found(job_id))
    }

    /// Reverse the job's consumption, then delete the job.
    ///
    /// If the reversal fails the job is left in place. If the delete fails
    /// after a committed reversal, the error says so; a retry is safe since
    /// reversal restores nothing twice.
    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub fn delete_job(&self, job_id: JobId) -> Result<ReversalReport, LedgerError> {
        let job = self.load(job_id)?;
        let report = self.reversal.reverse_job_consumption(&job)?;

        if let Err(e) = self.jobs.delete(job_id) {
            error!(
                restored = report.entries.len(),
                "job consumption reversed but job row not deleted"
            );
            return Err(LedgerError::store(
                WriteContext::new("delete job after reversal").job(job_id),
                e,
            ));
        }
        info!(restored = report.entries.len(), "job deleted");
        Ok(report)
    }

    /// Replace a job, moving stock from its old components to its new ones.
    ///
    /// The reversal of the stored job and the postings of `updated` are one
    /// batch: either both land or neither does.
    #[instrument(skip(self, updated), fields(job_id = %updated.id), err)]
    pub fn edit_job(&self, updated: Job) -> Result<JobEdit, LedgerError> {
        let current = self.load(updated.id)?;
        let postings = consumption_movements(&updated);
        let (plan, mut entries) = self.reversal.commit_with(&current, postings, "edit job")?;

        let reversal_count = plan.movements.len().min(entries.len());
        let posted = entries.split_off(reversal_count);
        let reversal = ReversalReport::new(plan, entries);

        let job_id = updated.id;
        if let Err(e) = self.jobs.save(updated) {
            error!(
                restored = reversal.entries.len(),
                posted = posted.len(),
                "job stock moved but edited job not saved"
            );
            return Err(LedgerError::store(
                WriteContext::new("save edited job").job(job_id),
                e,
            ));
        }

        info!(
            restored = reversal.entries.len(),
            posted = posted.len(),
            "job edited"
        );
        Ok(JobEdit { reversal, posted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock_store::InMemoryStockStore;
    use bagforge_core::{ComponentId, ExpectedVersion, MaterialId, OrderId};
    use bagforge_events::InMemoryEventBus;
    use bagforge_inventory::NewMaterial;
    use bagforge_production::{Component, OrderQuantity};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FailingDelete(InMemoryJobRepository);

    impl JobRepository for FailingDelete {
        fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
            self.0.get(id)
        }

        fn save(&self, job: Job) -> Result<(), StoreError> {
            self.0.save(job)
        }

        fn delete(&self, _: JobId) -> Result<bool, StoreError> {
            Err(StoreError::Storage("jobs table unavailable".into()))
        }
    }

    fn material(store: &InMemoryStockStore, opening: Decimal) -> MaterialId {
        store
            .onboard(NewMaterial::new("PP fabric", "m").with_opening_quantity(opening))
            .unwrap()
            .0
            .id()
    }

    fn job_with(order: OrderId, material: MaterialId, per_unit: Decimal, qty: u32) -> Job {
        Job::new(JobId::new(), order, "JC-9").with_component(
            Component::manual(
                ComponentId::new(),
                order,
                "cutting",
                Some(material),
                per_unit,
                OrderQuantity::try_from(qty).unwrap(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn unknown_job_is_not_found() {
        let lifecycle = JobLifecycle::new(
            Arc::new(InMemoryStockStore::new()),
            Arc::new(InMemoryEventBus::<StockEvent>::new()),
            InMemoryJobRepository::new(),
        );
        assert!(matches!(
            lifecycle.delete_job(JobId::new()),
            Err(LedgerError::NotFound { kind: "job", .. })
        ));
    }

    #[test]
    fn failed_delete_keeps_job_and_retry_restores_nothing_twice() {
        let store = Arc::new(InMemoryStockStore::new());
        let m = material(&store, dec!(50));
        let job = job_with(OrderId::new(), m, dec!(10), 1);
        store
            .commit(consumption_movements(&job))
            .unwrap();

        let repo = Arc::new(FailingDelete(InMemoryJobRepository::new()));
        repo.save(job.clone()).unwrap();
        let lifecycle = JobLifecycle::new(
            store.clone(),
            Arc::new(InMemoryEventBus::<StockEvent>::new()),
            repo.clone(),
        );

        assert!(matches!(
            lifecycle.delete_job(job.id),
            Err(LedgerError::WriteFailure { .. })
        ));
        assert!(repo.get(job.id).unwrap().is_some());
        assert_eq!(store.material(m).unwrap().unwrap().quantity(), dec!(50));

        // A second attempt finds everything already restored.
        let _ = lifecycle.delete_job(job.id);
        assert_eq!(store.material(m).unwrap().unwrap().quantity(), dec!(50));
    }

    #[test]
    fn edit_moves_stock_from_old_to_new_components() {
        let store = Arc::new(InMemoryStockStore::new());
        let m = material(&store, dec!(100));
        let order = OrderId::new();
        let original = job_with(order, m, dec!(3.2), 1);
        store.commit(consumption_movements(&original)).unwrap();

        let repo = Arc::new(InMemoryJobRepository::new());
        repo.save(original.clone()).unwrap();
        let lifecycle = JobLifecycle::new(
            store.clone(),
            Arc::new(InMemoryEventBus::<StockEvent>::new()),
            repo.clone(),
        );

        let mut updated = job_with(order, m, dec!(3.2), 5);
        updated.id = original.id;
        let edit = lifecycle.edit_job(updated).unwrap();

        assert_eq!(edit.reversal.entries.len(), 1);
        assert_eq!(edit.reversal.entries[0].quantity, dec!(3.2));
        assert_eq!(edit.posted.len(), 1);
        assert_eq!(edit.posted[0].quantity, dec!(-16.0));
        assert_eq!(store.material(m).unwrap().unwrap().quantity(), dec!(84.0));
        assert_eq!(
            repo.get(original.id).unwrap().unwrap().components[0].consumption(),
            Some(dec!(16.0))
        );
    }

    #[test]
    fn edit_onto_deleted_material_changes_nothing() {
        let store = Arc::new(InMemoryStockStore::new());
        let m = material(&store, dec!(100));
        let gone = material(&store, dec!(40));
        let impact = store.hard_delete_impact(gone).unwrap();
        store.hard_delete(gone, ExpectedVersion::Any, &impact).unwrap();

        let order = OrderId::new();
        let original = job_with(order, m, dec!(3.2), 1);
        store.commit(consumption_movements(&original)).unwrap();
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.save(original.clone()).unwrap();
        let lifecycle = JobLifecycle::new(
            store.clone(),
            Arc::new(InMemoryEventBus::<StockEvent>::new()),
            repo.clone(),
        );

        for target in [gone, MaterialId::new()] {
            let mut updated = job_with(order, target, dec!(1), 2);
            updated.id = original.id;
            assert!(matches!(
                lifecycle.edit_job(updated),
                Err(LedgerError::NotFound { kind: "material", .. })
            ));
        }

        assert_eq!(store.material(m).unwrap().unwrap().quantity(), dec!(96.8));
        assert_eq!(store.entries_for_material(m).unwrap().len(), 2);
        assert!(store.entries_for_material(gone).unwrap().is_empty());
        assert_eq!(repo.get(original.id).unwrap(), Some(original));
    }
}

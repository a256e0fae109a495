//! Hard delete of a material master, preserving its consumption history.
//!
//! Deleting requires a [`HardDeletePreview`], so the preview step cannot be
//! skipped. The delete is refused if anything changed between preview and
//! commit.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use bagforge_core::{ExpectedVersion, MaterialId, Versioned};
use bagforge_events::EventBus;
use bagforge_inventory::StockEvent;

use crate::error::{LedgerError, WriteContext};
use crate::notify;
use crate::stock_store::{HardDeleteCounts, StockStore};

pub const DELETION_TYPE: &str = "hard_delete_with_preservation";

/// What a hard delete would do, captured before any mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardDeletePreview {
    pub material_id: MaterialId,
    pub material_name: String,
    /// Version of the material row when the preview was taken.
    pub expected_version: u64,
    #[serde(flatten)]
    pub counts: HardDeleteCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardDeleteSummary {
    pub material_id: MaterialId,
    pub material_name: String,
    pub deletion_type: &'static str,
    pub counts: HardDeleteCounts,
    pub message: String,
}

#[derive(Debug)]
pub struct HardDeleteService<S, B> {
    store: S,
    bus: B,
}

impl<S, B> HardDeleteService<S, B>
where
    S: StockStore,
    B: EventBus<StockEvent>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    #[instrument(skip(self), fields(material_id = %material_id), err)]
    pub fn preview_hard_delete(
        &self,
        material_id: MaterialId,
    ) -> Result<HardDeletePreview, LedgerError> {
        let context = WriteContext::new("preview hard delete").material(material_id);
        let material = self
            .store
            .material(material_id)
            .map_err(|e| LedgerError::store(context.clone(), e))?
            .ok_or_else(|| LedgerError::material_not_found(material_id))?;
        let counts = self
            .store
            .hard_delete_impact(material_id)
            .map_err(|e| LedgerError::store(context, e))?;

        Ok(HardDeletePreview {
            material_id,
            material_name: material.name().to_string(),
            expected_version: material.version(),
            counts,
        })
    }

    /// Delete the previewed material.
    ///
    /// Removes the material row and its non-consumption ledger entries,
    /// detaches purchase items and catalog links, and keeps every consumption
    /// entry (with its `material_id`) for audit.
    #[instrument(skip(self, preview), fields(material_id = %preview.material_id), err)]
    pub fn hard_delete_material(
        &self,
        preview: &HardDeletePreview,
    ) -> Result<HardDeleteSummary, LedgerError> {
        let counts = self
            .store
            .hard_delete(
                preview.material_id,
                ExpectedVersion::Exact(preview.expected_version),
                &preview.counts,
            )
            .map_err(|e| {
                LedgerError::store(
                    WriteContext::new("hard delete material").material(preview.material_id),
                    e,
                )
            })?;

        notify::publish(
            &self.bus,
            StockEvent::MaterialHardDeleted {
                material_id: preview.material_id,
                material_name: preview.material_name.clone(),
                preserved_entries: counts.will_be_preserved.consumption_transactions,
                occurred_at: Utc::now(),
            },
        );

        let message = format!(
            "Material '{}' deleted. {} consumption transaction(s) preserved for audit; \
             {} other transaction(s) removed; {} purchase item(s) and {} component link(s) \
             no longer reference it.",
            preview.material_name,
            counts.will_be_preserved.consumption_transactions,
            counts.will_be_deleted.non_consumption_transactions,
            counts.will_be_modified.purchase_items_lose_material_ref,
            counts.will_be_modified.component_links_lose_material_ref,
        );
        info!(
            preserved = counts.will_be_preserved.consumption_transactions,
            removed = counts.will_be_deleted.non_consumption_transactions,
            "material hard-deleted"
        );

        Ok(HardDeleteSummary {
            material_id: preview.material_id,
            material_name: preview.material_name.clone(),
            deletion_type: DELETION_TYPE,
            counts,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::PostingService;
    use crate::stock_store::InMemoryStockStore;
    use bagforge_events::InMemoryEventBus;
    use bagforge_inventory::NewMaterial;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    type Store = Arc<InMemoryStockStore>;
    type Bus = Arc<InMemoryEventBus<StockEvent>>;

    fn setup() -> (PostingService<Store, Bus>, HardDeleteService<Store, Bus>, Bus) {
        let store = Arc::new(InMemoryStockStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        (
            PostingService::new(store.clone(), bus.clone()),
            HardDeleteService::new(store, bus.clone()),
            bus,
        )
    }

    #[test]
    fn stale_preview_is_refused() {
        let (posting, deleter, _) = setup();
        let material = posting
            .onboard_material(NewMaterial::new("PP fabric", "m").with_opening_quantity(dec!(5)))
            .unwrap()
            .id();

        let preview = deleter.preview_hard_delete(material).unwrap();
        posting.record_purchase(material, dec!(1), "PO-3").unwrap();

        let err = deleter.hard_delete_material(&preview).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert!(posting.store().material(material).unwrap().is_some());
    }

    #[test]
    fn summary_and_notification() {
        let (posting, deleter, bus) = setup();
        let material = posting
            .onboard_material(NewMaterial::new("Handle tape", "m").with_opening_quantity(dec!(2)))
            .unwrap()
            .id();
        let sub = bus.subscribe();

        let preview = deleter.preview_hard_delete(material).unwrap();
        assert_eq!(preview.counts.will_be_deleted.material, 1);
        assert_eq!(preview.counts.will_be_deleted.non_consumption_transactions, 1);

        let summary = deleter.hard_delete_material(&preview).unwrap();
        assert_eq!(summary.deletion_type, "hard_delete_with_preservation");
        assert_eq!(summary.material_name, "Handle tape");
        assert!(summary.message.contains("Handle tape"));
        assert!(matches!(
            sub.drain().as_slice(),
            [StockEvent::MaterialHardDeleted { preserved_entries: 0, .. }]
        ));

        assert!(matches!(
            deleter.preview_hard_delete(material),
            Err(LedgerError::NotFound { kind: "material", .. })
        ));
    }
}

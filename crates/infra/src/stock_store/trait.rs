use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use bagforge_core::{ComponentLinkId, ExpectedVersion, MaterialId, PurchaseItemId};
use bagforge_inventory::{LedgerEntry, Material, NewMaterial, StockMovement};
use bagforge_production::ComponentType;

/// Historical purchase line. Survives a hard delete of its material with the
/// material reference cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub id: PurchaseItemId,
    pub purchase_reference: String,
    pub material_id: Option<MaterialId>,
    pub quantity: Decimal,
    pub rate: Decimal,
}

/// Catalog link from a sellable item's component to the material it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentLink {
    pub id: ComponentLinkId,
    pub catalog_item: String,
    pub component_type: ComponentType,
    pub material_id: Option<MaterialId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WillBeDeleted {
    pub material: u64,
    pub non_consumption_transactions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WillBePreserved {
    pub consumption_transactions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WillBeModified {
    pub purchase_items_lose_material_ref: u64,
    pub component_links_lose_material_ref: u64,
}

/// What a hard delete of one material touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardDeleteCounts {
    pub will_be_deleted: WillBeDeleted,
    pub will_be_preserved: WillBePreserved,
    pub will_be_modified: WillBeModified,
}

/// Stock store operation error.
///
/// Storage-level failures; services attach job/component context before
/// surfacing them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("material not found: {0}")]
    MaterialNotFound(MaterialId),

    #[error("movement rejected for material {material_id}: {reason}")]
    InvalidMovement {
        material_id: MaterialId,
        reason: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Materials, their append-only ledger, and the rows that reference them.
///
/// ## Commit semantics
///
/// `commit()`:
/// - applies every movement in order, each as an atomic delta on the
///   material row taken inside the store's critical section
/// - computes each entry's previous/new quantity from the row as updated,
///   never from an earlier read
/// - assigns store-wide increasing sequence numbers
/// - persists all movements or none
///
/// Ledger entries are never updated. The only deletion is the hard delete,
/// which removes non-consumption entries of the deleted material.
pub trait StockStore: Send + Sync {
    /// Insert a material at zero stock and post its opening balance, atomically.
    fn onboard(&self, material: NewMaterial) -> Result<(Material, Option<LedgerEntry>), StoreError>;

    fn material(&self, id: MaterialId) -> Result<Option<Material>, StoreError>;

    /// Apply a batch of movements atomically.
    fn commit(&self, movements: Vec<StockMovement>) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Entries whose `reference_id` is `reference_id`, in sequence order.
    fn entries_for_reference(&self, reference_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Entries recorded against `material_id`, in sequence order. Still
    /// answers for preserved entries after the material was hard-deleted.
    fn entries_for_material(&self, material_id: MaterialId)
    -> Result<Vec<LedgerEntry>, StoreError>;

    fn insert_purchase_item(&self, item: PurchaseItem) -> Result<(), StoreError>;

    fn purchase_item(&self, id: PurchaseItemId) -> Result<Option<PurchaseItem>, StoreError>;

    fn insert_component_link(&self, link: ComponentLink) -> Result<(), StoreError>;

    fn component_link(&self, id: ComponentLinkId) -> Result<Option<ComponentLink>, StoreError>;

    /// Counts of what a hard delete would do right now, without mutating.
    fn hard_delete_impact(&self, material_id: MaterialId) -> Result<HardDeleteCounts, StoreError>;

    /// Hard-delete a material, preserving its consumption entries.
    ///
    /// Fails with `Conflict` unless the material is still at
    /// `expected_version` and its impact still equals `expected`.
    fn hard_delete(
        &self,
        material_id: MaterialId,
        expected_version: ExpectedVersion,
        expected: &HardDeleteCounts,
    ) -> Result<HardDeleteCounts, StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn onboard(&self, material: NewMaterial) -> Result<(Material, Option<LedgerEntry>), StoreError> {
        (**self).onboard(material)
    }

    fn material(&self, id: MaterialId) -> Result<Option<Material>, StoreError> {
        (**self).material(id)
    }

    fn commit(&self, movements: Vec<StockMovement>) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).commit(movements)
    }

    fn entries_for_reference(&self, reference_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).entries_for_reference(reference_id)
    }

    fn entries_for_material(
        &self,
        material_id: MaterialId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).entries_for_material(material_id)
    }

    fn insert_purchase_item(&self, item: PurchaseItem) -> Result<(), StoreError> {
        (**self).insert_purchase_item(item)
    }

    fn purchase_item(&self, id: PurchaseItemId) -> Result<Option<PurchaseItem>, StoreError> {
        (**self).purchase_item(id)
    }

    fn insert_component_link(&self, link: ComponentLink) -> Result<(), StoreError> {
        (**self).insert_component_link(link)
    }

    fn component_link(&self, id: ComponentLinkId) -> Result<Option<ComponentLink>, StoreError> {
        (**self).component_link(id)
    }

    fn hard_delete_impact(&self, material_id: MaterialId) -> Result<HardDeleteCounts, StoreError> {
        (**self).hard_delete_impact(material_id)
    }

    fn hard_delete(
        &self,
        material_id: MaterialId,
        expected_version: ExpectedVersion,
        expected: &HardDeleteCounts,
    ) -> Result<HardDeleteCounts, StoreError> {
        (**self).hard_delete(material_id, expected_version, expected)
    }
}

/// Impact of hard-deleting `material_id`, computed from rows already loaded.
pub(crate) fn count_impact<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    purchase_items: impl IntoIterator<Item = &'a PurchaseItem>,
    component_links: impl IntoIterator<Item = &'a ComponentLink>,
    material_id: MaterialId,
) -> HardDeleteCounts {
    let mut counts = HardDeleteCounts {
        will_be_deleted: WillBeDeleted {
            material: 1,
            non_consumption_transactions: 0,
        },
        ..HardDeleteCounts::default()
    };
    for e in entries.into_iter().filter(|e| e.material_id == material_id) {
        if e.transaction_type.is_consumption() {
            counts.will_be_preserved.consumption_transactions += 1;
        } else {
            counts.will_be_deleted.non_consumption_transactions += 1;
        }
    }
    counts.will_be_modified.purchase_items_lose_material_ref = purchase_items
        .into_iter()
        .filter(|p| p.material_id == Some(material_id))
        .count() as u64;
    counts.will_be_modified.component_links_lose_material_ref = component_links
        .into_iter()
        .filter(|l| l.material_id == Some(material_id))
        .count() as u64;
    counts
}

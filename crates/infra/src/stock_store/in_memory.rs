use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use bagforge_core::{
    ComponentLinkId, DomainError, ExpectedVersion, LedgerEntryId, MaterialId, PurchaseItemId,
    Versioned,
};
use bagforge_inventory::{LedgerEntry, Material, NewMaterial, ReversalTarget, StockMovement};

use super::r#trait::{
    ComponentLink, HardDeleteCounts, PurchaseItem, StockStore, StoreError, count_impact,
};

#[derive(Debug, Default)]
struct State {
    materials: HashMap<MaterialId, Material>,
    entries: Vec<LedgerEntry>,
    purchase_items: HashMap<PurchaseItemId, PurchaseItem>,
    component_links: HashMap<ComponentLinkId, ComponentLink>,
    last_sequence: u64,
}

impl State {
    /// Apply `movements` to working copies of the touched rows.
    ///
    /// Nothing in `self` changes; the caller installs the result only when
    /// the whole batch succeeded.
    fn stage(
        &self,
        movements: Vec<StockMovement>,
    ) -> Result<(HashMap<MaterialId, Material>, Vec<LedgerEntry>), StoreError> {
        let at = Utc::now();
        let mut touched: HashMap<MaterialId, Material> = HashMap::new();
        let mut entries = Vec::with_capacity(movements.len());
        let mut sequence = self.last_sequence;
        let mut reversed = self.reversal_targets(&movements);

        for movement in movements {
            let material_id = movement.material_id;
            if let Some(target) = movement.reversal_target() {
                if !reversed.insert(target) {
                    return Err(StoreError::Conflict(format!("{target} is already reversed")));
                }
            }
            let row = match touched.entry(material_id) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    let current = self
                        .materials
                        .get(&material_id)
                        .ok_or(StoreError::MaterialNotFound(material_id))?;
                    e.insert(current.clone())
                }
            };
            sequence += 1;
            let entry = row
                .apply(movement, LedgerEntryId::new(), sequence, at)
                .map_err(|err| reject(material_id, err))?;
            entries.push(entry);
        }

        Ok((touched, entries))
    }

    /// Targets already reversed in the ledger; empty when the batch reverses nothing.
    fn reversal_targets(&self, movements: &[StockMovement]) -> HashSet<ReversalTarget> {
        if movements.iter().all(|m| m.reversal_target().is_none()) {
            return HashSet::new();
        }
        self.entries
            .iter()
            .filter_map(LedgerEntry::reversal_target)
            .collect()
    }
}

fn reject(material_id: MaterialId, err: DomainError) -> StoreError {
    match err {
        DomainError::Conflict(msg) => StoreError::Conflict(msg),
        other => StoreError::InvalidMovement {
            material_id,
            reason: other.to_string(),
        },
    }
}

/// In-memory stock store.
///
/// Intended for tests/dev. A whole batch is staged and installed under one
/// write lock, so concurrent commits serialize and never lose an update.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<State>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

impl StockStore for InMemoryStockStore {
    fn onboard(&self, new: NewMaterial) -> Result<(Material, Option<LedgerEntry>), StoreError> {
        new.validate().map_err(|err| reject(new.id, err))?;
        let opening = new.opening_movement();
        let material = new.into_material();
        let id = material.id();

        let mut state = self.write()?;
        if state.materials.contains_key(&id) {
            return Err(StoreError::Conflict(format!("material {id} already exists")));
        }
        state.materials.insert(id, material.clone());

        let Some(opening) = opening else {
            return Ok((material, None));
        };
        match state.stage(vec![opening]) {
            Ok((mut touched, mut entries)) => {
                let material = touched.remove(&id).unwrap_or(material);
                let entry = entries.pop();
                state.last_sequence += 1;
                state.materials.insert(id, material.clone());
                state.entries.extend(entry.clone());
                Ok((material, entry))
            }
            Err(err) => {
                state.materials.remove(&id);
                Err(err)
            }
        }
    }

    fn material(&self, id: MaterialId) -> Result<Option<Material>, StoreError> {
        Ok(self.read()?.materials.get(&id).cloned())
    }

    fn commit(&self, movements: Vec<StockMovement>) -> Result<Vec<LedgerEntry>, StoreError> {
        if movements.is_empty() {
            return Ok(vec![]);
        }

        let mut state = self.write()?;
        let (touched, entries) = state.stage(movements)?;

        state.last_sequence += entries.len() as u64;
        state.materials.extend(touched);
        state.entries.extend(entries.iter().cloned());
        Ok(entries)
    }

    fn entries_for_reference(&self, reference_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .read()?
            .entries
            .iter()
            .filter(|e| e.reference_id == Some(reference_id))
            .cloned()
            .collect())
    }

    fn entries_for_material(
        &self,
        material_id: MaterialId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .read()?
            .entries
            .iter()
            .filter(|e| e.material_id == material_id)
            .cloned()
            .collect())
    }

    fn insert_purchase_item(&self, item: PurchaseItem) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.purchase_items.contains_key(&item.id) {
            return Err(StoreError::Conflict(format!(
                "purchase item {} already exists",
                item.id
            )));
        }
        state.purchase_items.insert(item.id, item);
        Ok(())
    }

    fn purchase_item(&self, id: PurchaseItemId) -> Result<Option<PurchaseItem>, StoreError> {
        Ok(self.read()?.purchase_items.get(&id).cloned())
    }

    fn insert_component_link(&self, link: ComponentLink) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.component_links.contains_key(&link.id) {
            return Err(StoreError::Conflict(format!(
                "component link {} already exists",
                link.id
            )));
        }
        state.component_links.insert(link.id, link);
        Ok(())
    }

    fn component_link(&self, id: ComponentLinkId) -> Result<Option<ComponentLink>, StoreError> {
        Ok(self.read()?.component_links.get(&id).cloned())
    }

    fn hard_delete_impact(&self, material_id: MaterialId) -> Result<HardDeleteCounts, StoreError> {
        let state = self.read()?;
        if !state.materials.contains_key(&material_id) {
            return Err(StoreError::MaterialNotFound(material_id));
        }
        Ok(count_impact(
            &state.entries,
            state.purchase_items.values(),
            state.component_links.values(),
            material_id,
        ))
    }

    fn hard_delete(
        &self,
        material_id: MaterialId,
        expected_version: ExpectedVersion,
        expected: &HardDeleteCounts,
    ) -> Result<HardDeleteCounts, StoreError> {
        let mut state = self.write()?;
        let material = state
            .materials
            .get(&material_id)
            .ok_or(StoreError::MaterialNotFound(material_id))?;
        expected_version
            .check(material.version())
            .map_err(|err| reject(material_id, err))?;

        let counts = count_impact(
            &state.entries,
            state.purchase_items.values(),
            state.component_links.values(),
            material_id,
        );
        if counts != *expected {
            return Err(StoreError::Conflict(format!(
                "impact of deleting material {material_id} changed since preview"
            )));
        }

        state.materials.remove(&material_id);
        state
            .entries
            .retain(|e| e.material_id != material_id || e.transaction_type.is_consumption());
        for item in state.purchase_items.values_mut() {
            if item.material_id == Some(material_id) {
                item.material_id = None;
            }
        }
        for link in state.component_links.values_mut() {
            if link.material_id == Some(material_id) {
                link.material_id = None;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bagforge_core::{ComponentId, JobId, OrderId};
    use bagforge_inventory::TransactionType;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn store_with(opening: Decimal) -> (InMemoryStockStore, MaterialId) {
        let store = InMemoryStockStore::new();
        let (m, _) = store
            .onboard(NewMaterial::new("PP fabric", "m").with_opening_quantity(opening))
            .unwrap();
        (store, m.id())
    }

    fn consume(material: MaterialId, amount: Decimal) -> StockMovement {
        StockMovement::consumption(
            material,
            ComponentId::new(),
            "cutting".into(),
            amount,
            OrderId::new(),
            JobId::new(),
        )
    }

    #[test]
    fn onboarding_records_opening_entry() {
        let (store, id) = store_with(dec!(100));
        let entries = store.entries_for_material(id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_type, TransactionType::Opening);
        assert_eq!(store.material(id).unwrap().unwrap().quantity(), dec!(100));
    }

    #[test]
    fn duplicate_onboarding_conflicts() {
        let store = InMemoryStockStore::new();
        let new = NewMaterial::new("ink", "l");
        store.onboard(new.clone()).unwrap();
        assert!(matches!(store.onboard(new), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let (store, id) = store_with(dec!(10));
        let missing = MaterialId::new();

        let err = store
            .commit(vec![consume(id, dec!(4)), consume(missing, dec!(1))])
            .unwrap_err();
        assert!(matches!(err, StoreError::MaterialNotFound(m) if m == missing));
        assert_eq!(store.material(id).unwrap().unwrap().quantity(), dec!(10));
        assert_eq!(store.entries_for_material(id).unwrap().len(), 1);
    }

    #[test]
    fn entries_in_one_batch_chain_quantities() {
        let (store, id) = store_with(dec!(100));
        let entries = store
            .commit(vec![consume(id, dec!(12.5)), consume(id, dec!(7.3))])
            .unwrap();

        assert_eq!(entries[0].previous_quantity, dec!(100));
        assert_eq!(entries[0].new_quantity, dec!(87.5));
        assert_eq!(entries[1].previous_quantity, dec!(87.5));
        assert_eq!(entries[1].new_quantity, dec!(80.2));
        assert!(entries[0].sequence < entries[1].sequence);
    }

    #[test]
    fn stale_version_conflicts() {
        let (store, id) = store_with(dec!(1));
        let movement = StockMovement::manual(id, dec!(1), "recount").expecting(ExpectedVersion::Exact(0));
        assert!(matches!(store.commit(vec![movement]), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn concurrent_commits_lose_no_update() {
        let (store, id) = store_with(dec!(0));
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.commit(vec![consume(id, dec!(1))]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.material(id).unwrap().unwrap().quantity(), dec!(-400));
        let entries = store.entries_for_material(id).unwrap();
        let sum: Decimal = entries.iter().map(|e| e.quantity).sum();
        assert_eq!(sum, dec!(-400));
    }

    #[test]
    fn entry_is_reversed_at_most_once() {
        let (store, id) = store_with(dec!(100));
        let job = JobId::new();
        let consumed = store.commit(vec![consume(id, dec!(12.5))]).unwrap();
        let restore = StockMovement::reversal(
            id,
            dec!(12.5),
            job,
            consumed[0].metadata.component_id,
            None,
            Some(consumed[0].id),
        );

        store.commit(vec![restore.clone()]).unwrap();
        assert!(matches!(
            store.commit(vec![restore.clone()]),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.commit(vec![consume(id, dec!(1)), restore]),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.material(id).unwrap().unwrap().quantity(), dec!(100));
        assert_eq!(store.entries_for_material(id).unwrap().len(), 3);
    }

    #[test]
    fn fallback_reversal_repeated_in_one_batch_is_refused() {
        let (store, id) = store_with(dec!(0));
        let restore = StockMovement::reversal(
            id,
            dec!(2),
            JobId::new(),
            Some(ComponentId::new()),
            None,
            None,
        );

        assert!(matches!(
            store.commit(vec![restore.clone(), restore]),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.material(id).unwrap().unwrap().quantity(), dec!(0));
        assert!(store.entries_for_material(id).unwrap().is_empty());
    }
}

//! Reversal planning: matching a job's components to the consumption the
//! ledger recorded for them.
//!
//! Several components of one job can draw the same material in different
//! amounts, so entries are keyed by material *and* component. Only entries
//! written without a component id fall back to material + component type.

use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;

use bagforge_core::{ComponentId, JobId, LedgerEntryId, MaterialId};
use bagforge_production::{Component, ComponentType, Job};

use crate::ledger::{LedgerEntry, StockMovement, TransactionType};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RestorationKey {
    Component {
        material_id: MaterialId,
        component_id: ComponentId,
    },
    ComponentType {
        material_id: MaterialId,
        component_type: ComponentType,
    },
}

impl RestorationKey {
    /// Key of a ledger entry, or `None` when it carries neither a component id
    /// nor a component type.
    pub fn for_entry(entry: &LedgerEntry) -> Option<Self> {
        let material_id = entry.material_id;
        match (&entry.metadata.component_id, &entry.metadata.component_type) {
            (Some(component_id), _) => Some(RestorationKey::Component {
                material_id,
                component_id: *component_id,
            }),
            (None, Some(component_type)) => Some(RestorationKey::ComponentType {
                material_id,
                component_type: component_type.clone(),
            }),
            (None, None) => None,
        }
    }

    /// Lookup keys for a component, most specific first.
    pub fn for_component(material_id: MaterialId, component: &Component) -> [Self; 2] {
        [
            RestorationKey::Component {
                material_id,
                component_id: component.id(),
            },
            RestorationKey::ComponentType {
                material_id,
                component_type: component.component_type().clone(),
            },
        ]
    }
}

/// One planned restoration of stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Restoration {
    /// The original consumption entry was found; its magnitude is restored.
    Exact {
        material_id: MaterialId,
        component_id: Option<ComponentId>,
        component_type: Option<ComponentType>,
        amount: Decimal,
        original_entry_id: LedgerEntryId,
    },
    /// No consumption entry matched; the component's present consumption is
    /// restored as a best effort.
    Fallback {
        material_id: MaterialId,
        component_id: ComponentId,
        component_type: ComponentType,
        amount: Decimal,
    },
}

impl Restoration {
    pub fn material_id(&self) -> MaterialId {
        match self {
            Restoration::Exact { material_id, .. } | Restoration::Fallback { material_id, .. } => {
                *material_id
            }
        }
    }

    pub fn restored_amount(&self) -> Decimal {
        match self {
            Restoration::Exact { amount, .. } | Restoration::Fallback { amount, .. } => *amount,
        }
    }

    pub fn component_id(&self) -> Option<ComponentId> {
        match self {
            Restoration::Exact { component_id, .. } => *component_id,
            Restoration::Fallback { component_id, .. } => Some(*component_id),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Restoration::Exact { .. })
    }

    fn to_movement(&self, job_id: JobId) -> StockMovement {
        match self {
            Restoration::Exact {
                material_id,
                component_id,
                component_type,
                amount,
                original_entry_id,
            } => StockMovement::reversal(
                *material_id,
                *amount,
                job_id,
                *component_id,
                component_type.clone(),
                Some(*original_entry_id),
            ),
            Restoration::Fallback {
                material_id,
                component_id,
                component_type,
                amount,
            } => StockMovement::reversal(
                *material_id,
                *amount,
                job_id,
                Some(*component_id),
                Some(component_type.clone()),
                None,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipCause {
    /// Every consumption recorded for the component was already restored.
    AlreadyReversed,
    /// Nothing recorded and nothing to fall back on.
    NoConsumption,
    /// The material was hard-deleted after the consumption was posted.
    MaterialMissing,
}

/// A material-bearing component for which nothing is restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRestoration {
    pub component_id: Option<ComponentId>,
    pub material_id: MaterialId,
    pub cause: SkipCause,
}

/// Everything needed to undo a job's consumption, not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalPlan {
    pub job_id: JobId,
    pub restorations: Vec<Restoration>,
    pub skipped: Vec<SkippedRestoration>,
    pub movements: Vec<StockMovement>,
}

impl ReversalPlan {
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// Whether any restoration had to fall back to present-day consumption.
    pub fn is_partial(&self) -> bool {
        self.restorations.iter().any(|r| !r.is_exact())
    }

    /// Drop restorations whose material fails `keep`, reporting them as
    /// skipped with [`SkipCause::MaterialMissing`].
    pub fn retain_materials<F>(&mut self, mut keep: F)
    where
        F: FnMut(MaterialId) -> bool,
    {
        let restorations = std::mem::take(&mut self.restorations);
        let movements = std::mem::take(&mut self.movements);
        for (restoration, movement) in restorations.into_iter().zip(movements) {
            if keep(restoration.material_id()) {
                self.restorations.push(restoration);
                self.movements.push(movement);
            } else {
                self.skipped.push(SkippedRestoration {
                    component_id: restoration.component_id(),
                    material_id: restoration.material_id(),
                    cause: SkipCause::MaterialMissing,
                });
            }
        }
    }
}

/// Plan the reversal of `job` from the ledger entries that reference it.
///
/// - Each unreversed consumption entry is restored at most once, by its exact
///   magnitude, against the component it names.
/// - A component with no recorded consumption falls back to its current
///   consumption, unless a previous fallback already restored it.
/// - Unreversed consumption for components no longer on the job is restored
///   too, so deleting a job returns everything it drew.
pub fn plan_reversal(job: &Job, entries: &[LedgerEntry]) -> ReversalPlan {
    let job_entries: Vec<&LedgerEntry> = entries.iter().filter(|e| e.references_job(job.id)).collect();

    let mut reversed: HashSet<LedgerEntryId> = HashSet::new();
    let mut fallback_done: HashSet<(MaterialId, ComponentId)> = HashSet::new();
    for e in job_entries
        .iter()
        .filter(|e| e.transaction_type == TransactionType::JobCardReversal)
    {
        match (e.metadata.reverses_entry_id, e.metadata.component_id) {
            (Some(original), _) => {
                reversed.insert(original);
            }
            (None, Some(component_id)) => {
                fallback_done.insert((e.material_id, component_id));
            }
            (None, None) => {}
        }
    }

    let mut recorded: HashSet<RestorationKey> = HashSet::new();
    let mut unreversed: BTreeMap<RestorationKey, Vec<&LedgerEntry>> = BTreeMap::new();
    let mut unkeyed: Vec<&LedgerEntry> = Vec::new();
    for e in job_entries
        .iter()
        .copied()
        .filter(|e| e.transaction_type == TransactionType::Consumption)
    {
        let Some(key) = RestorationKey::for_entry(e) else {
            if !reversed.contains(&e.id) {
                unkeyed.push(e);
            }
            continue;
        };
        recorded.insert(key.clone());
        if !reversed.contains(&e.id) {
            unreversed.entry(key).or_default().push(e);
        }
    }
    for bucket in unreversed.values_mut() {
        bucket.sort_by_key(|e| e.sequence);
    }

    let mut restorations = Vec::new();
    let mut skipped = Vec::new();

    for component in &job.components {
        let Some(material_id) = component.material_id() else {
            continue;
        };
        let keys = RestorationKey::for_component(material_id, component);

        let latest = keys
            .iter()
            .find_map(|key| unreversed.get_mut(key).and_then(|bucket| bucket.pop()));
        if let Some(entry) = latest {
            restorations.push(exact(entry, Some(component)));
            continue;
        }

        let already = keys.iter().any(|key| recorded.contains(key))
            || fallback_done.contains(&(material_id, component.id()));
        if already {
            skipped.push(SkippedRestoration {
                component_id: Some(component.id()),
                material_id,
                cause: SkipCause::AlreadyReversed,
            });
            continue;
        }

        match component.consumption() {
            Some(amount) if amount > Decimal::ZERO => restorations.push(Restoration::Fallback {
                material_id,
                component_id: component.id(),
                component_type: component.component_type().clone(),
                amount,
            }),
            _ => skipped.push(SkippedRestoration {
                component_id: Some(component.id()),
                material_id,
                cause: SkipCause::NoConsumption,
            }),
        }
    }

    // Consumption whose component has left the job.
    let mut orphaned: Vec<&LedgerEntry> = unreversed.into_values().flatten().chain(unkeyed).collect();
    orphaned.sort_by_key(|e| e.sequence);
    restorations.extend(orphaned.into_iter().map(|e| exact(e, None)));

    let movements = restorations.iter().map(|r| r.to_movement(job.id)).collect();
    ReversalPlan {
        job_id: job.id,
        restorations,
        skipped,
        movements,
    }
}

fn exact(entry: &LedgerEntry, component: Option<&Component>) -> Restoration {
    Restoration::Exact {
        material_id: entry.material_id,
        component_id: entry
            .metadata
            .component_id
            .or_else(|| component.map(Component::id)),
        component_type: entry
            .metadata
            .component_type
            .clone()
            .or_else(|| component.map(|c| c.component_type().clone())),
        amount: entry.quantity.abs(),
        original_entry_id: entry.id,
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bagforge_core::{LedgerEntryId, MaterialId};
use bagforge_events::Event;

use crate::ledger::{LedgerEntry, TransactionType};

/// Notifications published after a stock change has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    StockChanged {
        material_id: MaterialId,
        entry_id: LedgerEntryId,
        sequence: u64,
        transaction_type: TransactionType,
        delta: Decimal,
        new_quantity: Decimal,
        occurred_at: DateTime<Utc>,
    },
    MaterialHardDeleted {
        material_id: MaterialId,
        material_name: String,
        preserved_entries: u64,
        occurred_at: DateTime<Utc>,
    },
}

impl StockEvent {
    pub fn stock_changed(entry: &LedgerEntry) -> Self {
        StockEvent::StockChanged {
            material_id: entry.material_id,
            entry_id: entry.id,
            sequence: entry.sequence,
            transaction_type: entry.transaction_type,
            delta: entry.quantity,
            new_quantity: entry.new_quantity,
            occurred_at: entry.created_at,
        }
    }

    pub fn material_id(&self) -> MaterialId {
        match self {
            StockEvent::StockChanged { material_id, .. }
            | StockEvent::MaterialHardDeleted { material_id, .. } => *material_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockChanged { .. } => "inventory.material.stock_changed",
            StockEvent::MaterialHardDeleted { .. } => "inventory.material.hard_deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockChanged { occurred_at, .. }
            | StockEvent::MaterialHardDeleted { occurred_at, .. } => *occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::StockMovement;
    use rust_decimal_macros::dec;

    #[test]
    fn stock_changed_carries_committed_quantities() {
        let material_id = MaterialId::new();
        let entry = StockMovement::purchase(material_id, dec!(4)).into_entry(
            LedgerEntryId::new(),
            9,
            "m",
            dec!(1),
            dec!(5),
            Utc::now(),
        );

        let event = StockEvent::stock_changed(&entry);
        assert_eq!(event.event_type(), "inventory.material.stock_changed");
        assert_eq!(event.material_id(), material_id);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stock_changed");
        assert_eq!(json["sequence"], 9);
        assert_eq!(json["new_quantity"], "5");
    }
}

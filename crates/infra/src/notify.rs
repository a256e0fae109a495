use tracing::warn;

use bagforge_events::{Event, EventBus};
use bagforge_inventory::{LedgerEntry, StockEvent};

/// Publish one `StockChanged` per committed entry.
///
/// Runs strictly after the commit; a failed publish is logged and does not
/// undo or fail the write.
pub(crate) fn publish_committed<B>(bus: &B, entries: &[LedgerEntry])
where
    B: EventBus<StockEvent>,
{
    for entry in entries {
        publish(bus, StockEvent::stock_changed(entry));
    }
}

pub(crate) fn publish<B>(bus: &B, event: StockEvent)
where
    B: EventBus<StockEvent>,
{
    let material_id = event.material_id();
    let event_type = event.event_type();
    if let Err(err) = bus.publish(event) {
        warn!(%material_id, event_type, error = ?err, "stock notification not published");
    }
}

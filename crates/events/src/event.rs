use chrono::{DateTime, Utc};

/// A notification describing something that already happened.
///
/// Events are immutable facts. `event_type` is a stable dotted name
/// (e.g. "inventory.material.stock_changed") that consumers can route on.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the underlying change was committed.
    fn occurred_at(&self) -> DateTime<Utc>;
}

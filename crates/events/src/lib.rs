//! Change notifications: event contract and pub/sub mechanics.
//!
//! Notifications are published only after the store has committed the change
//! they describe. They are hints for dependent views, not a source of truth.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

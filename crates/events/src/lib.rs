//! Notification plumbing for the inventory core.
//!
//! The engines publish [`InventoryNotification`]s on an [`EventBus`] after a
//! successful commit. Publication is fire-and-forget: a failing bus never fails
//! the operation that triggered it.

pub mod bus;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, NullEventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus, DEFAULT_SUBSCRIBER_CAPACITY};
pub use notification::{InventoryNotification, LowStockAlert};

//! Shared fixtures for the in-crate tests.

use std::sync::Arc;
use std::time::Duration;

use stockroom_core::{LocationId, ProductId, UserId};
use stockroom_events::{EventBus, InMemoryEventBus, InventoryNotification, Subscription};
use stockroom_inventory::StockKey;

use crate::catalog::InMemoryCatalog;
use crate::engine::EngineContext;
use crate::store::InMemoryInventoryStore;

pub(crate) type TestContext = EngineContext<
    Arc<InMemoryInventoryStore>,
    Arc<InMemoryCatalog>,
    Arc<InMemoryEventBus<InventoryNotification>>,
>;

/// One product stocked (or stockable) at two active locations.
pub(crate) struct Fixture {
    pub ctx: TestContext,
    pub store: Arc<InMemoryInventoryStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub bus: Arc<InMemoryEventBus<InventoryNotification>>,
    pub notifications: Subscription<InventoryNotification>,
    pub product: ProductId,
    pub loc1: LocationId,
    pub loc2: LocationId,
    pub user: UserId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_millis(500))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        let store = Arc::new(InMemoryInventoryStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let bus = Arc::new(InMemoryEventBus::<InventoryNotification>::new());
        let notifications = bus.subscribe();

        let product = catalog.add_product("SKU-001", "Widget").unwrap();
        let loc1 = catalog.add_location("Main warehouse").unwrap();
        let loc2 = catalog.add_location("Storefront").unwrap();

        Self {
            ctx: EngineContext::new(Arc::clone(&store), Arc::clone(&catalog), Arc::clone(&bus), lock_timeout),
            store,
            catalog,
            bus,
            notifications,
            product,
            loc1,
            loc2,
            user: UserId::new(),
        }
    }

    pub fn key1(&self) -> StockKey {
        StockKey::new(self.product, self.loc1)
    }

    pub fn key2(&self) -> StockKey {
        StockKey::new(self.product, self.loc2)
    }
}

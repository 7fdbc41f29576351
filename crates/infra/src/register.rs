//! Quantity register: current stock per (product, location).
//!
//! Reads go straight to committed state. Writes are free functions over an
//! open [`UnitOfWork`], so the only way to change a record is from inside an
//! engine that already holds the key's lock.

use chrono::{DateTime, Utc};

use stockroom_core::{InventoryResult, LocationId, ProductId};
use stockroom_inventory::{InventoryRecord, StockKey, StockLevels};

use crate::store::{InventoryStore, UnitOfWork};

/// Read side of the register.
#[derive(Debug, Clone)]
pub struct QuantityRegister<S> {
    store: S,
}

impl<S> QuantityRegister<S>
where
    S: InventoryStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The committed record, or `None` if the product was never stocked here.
    pub async fn get(&self, product_id: ProductId, location_id: LocationId) -> InventoryResult<Option<InventoryRecord>> {
        Ok(self.store.record(StockKey::new(product_id, location_id)).await?)
    }

    /// One record per location holding the product.
    pub async fn get_all(&self, product_id: ProductId) -> InventoryResult<Vec<InventoryRecord>> {
        Ok(self.store.records_for_product(product_id).await?)
    }
}

/// Current record for a locked key; absent reads as an empty record.
pub async fn load(uow: &mut dyn UnitOfWork, key: StockKey, now: DateTime<Utc>) -> InventoryResult<InventoryRecord> {
    Ok(uow
        .load(key)
        .await?
        .unwrap_or_else(|| InventoryRecord::empty(key, now)))
}

/// Set the on-hand quantity of a locked key.
///
/// Fails with `NegativeQuantity` below zero and `ReservedExceedsQuantity`
/// below the reserved amount; nothing is staged on failure.
pub async fn upsert_quantity(
    uow: &mut dyn UnitOfWork,
    key: StockKey,
    quantity: i64,
    now: DateTime<Utc>,
) -> InventoryResult<InventoryRecord> {
    let record = load(uow, key, now).await?.with_quantity(quantity, now)?;
    uow.save(record.clone()).await?;
    Ok(record)
}

pub async fn put_reserved(
    uow: &mut dyn UnitOfWork,
    key: StockKey,
    reserved_quantity: i64,
    now: DateTime<Utc>,
) -> InventoryResult<InventoryRecord> {
    let record = load(uow, key, now).await?.with_reserved(reserved_quantity, now)?;
    uow.save(record.clone()).await?;
    Ok(record)
}

pub async fn put_levels(
    uow: &mut dyn UnitOfWork,
    key: StockKey,
    levels: StockLevels,
    now: DateTime<Utc>,
) -> InventoryResult<InventoryRecord> {
    let record = load(uow, key, now).await?.with_levels(levels, now);
    uow.save(record.clone()).await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use stockroom_core::InventoryError;

    use crate::store::InMemoryInventoryStore;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn upsert_creates_missing_records() {
        let store = Arc::new(InMemoryInventoryStore::new());
        let key = StockKey::new(ProductId::new(), LocationId::new());

        let mut uow = store.begin(&[key], TIMEOUT).await.unwrap();
        let record = upsert_quantity(uow.as_mut(), key, 12, Utc::now()).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(record.quantity, 12);
        let register = QuantityRegister::new(Arc::clone(&store));
        let stored = register.get(key.product_id, key.location_id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 12);
        assert_eq!(register.get_all(key.product_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_refuses_to_break_invariants() {
        let store = InMemoryInventoryStore::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());

        let mut uow = store.begin(&[key], TIMEOUT).await.unwrap();
        upsert_quantity(uow.as_mut(), key, 5, Utc::now()).await.unwrap();
        put_reserved(uow.as_mut(), key, 4, Utc::now()).await.unwrap();

        assert_eq!(
            upsert_quantity(uow.as_mut(), key, -1, Utc::now()).await,
            Err(InventoryError::NegativeQuantity { quantity: -1 })
        );
        assert_eq!(
            upsert_quantity(uow.as_mut(), key, 3, Utc::now()).await,
            Err(InventoryError::ReservedExceedsQuantity { quantity: 3, reserved: 4 })
        );
        assert_eq!(load(uow.as_mut(), key, Utc::now()).await.unwrap().quantity, 5);
    }
}

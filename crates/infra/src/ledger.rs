//! Movement ledger: the append-only history every quantity change writes to.
//!
//! There is no update or delete. A mistake is corrected by appending a
//! compensating entry (see [`crate::engine::AdjustmentEngine::compensate`]).

use chrono::{DateTime, Utc};

use stockroom_core::{InventoryError, InventoryResult, MovementId, ProductId};
use stockroom_inventory::{MovementEntry, MovementFilter, NewMovement};

use crate::store::{InventoryStore, MovementPage, Pagination, UnitOfWork};

/// Read side of the ledger.
#[derive(Debug, Clone)]
pub struct MovementLedger<S> {
    store: S,
    max_page_size: u32,
}

impl<S> MovementLedger<S>
where
    S: InventoryStore,
{
    pub fn new(store: S, max_page_size: u32) -> Self {
        Self { store, max_page_size }
    }

    /// Matching entries, newest first.
    pub async fn list(&self, filter: &MovementFilter, page: Pagination) -> InventoryResult<MovementPage> {
        Ok(self.store.movements(filter, page.clamped(self.max_page_size)).await?)
    }

    pub async fn get(&self, id: MovementId) -> InventoryResult<MovementEntry> {
        self.store
            .movement(id)
            .await?
            .ok_or_else(|| InventoryError::not_found("movement", id))
    }

    /// Every entry of a product, oldest first.
    pub async fn history(&self, product_id: ProductId) -> InventoryResult<Vec<MovementEntry>> {
        Ok(self.store.product_history(product_id).await?)
    }
}

/// Validate `movement`, assign it an id and stage it in `uow`.
///
/// Zero quantities and signs that contradict the movement type are rejected
/// before anything is staged.
pub async fn append(
    uow: &mut dyn UnitOfWork,
    movement: NewMovement,
    now: DateTime<Utc>,
) -> InventoryResult<MovementEntry> {
    let entry = MovementEntry::record(movement, MovementId::new(), now)?;
    uow.append(entry.clone()).await?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use stockroom_core::{LocationId, UserId};
    use stockroom_inventory::{MovementType, StockKey};

    use crate::store::InMemoryInventoryStore;

    #[tokio::test]
    async fn rejects_zero_and_missigned_entries() {
        let store = InMemoryInventoryStore::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());
        let user = UserId::new();
        let mut uow = store.begin(&[key], Duration::from_secs(1)).await.unwrap();

        let zero = append(uow.as_mut(), NewMovement::new(key, MovementType::Adjustment, 0, user), Utc::now()).await;
        assert!(matches!(zero, Err(InventoryError::InvalidQuantity(_))));

        let negative_receipt = append(uow.as_mut(), NewMovement::new(key, MovementType::In, -3, user), Utc::now()).await;
        assert!(matches!(negative_receipt, Err(InventoryError::InvalidMovement(_))));

        uow.commit().await.unwrap();
        assert_eq!(store.product_history(key.product_id).await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn lists_committed_entries_and_finds_by_id() {
        let store = Arc::new(InMemoryInventoryStore::new());
        let key = StockKey::new(ProductId::new(), LocationId::new());
        let user = UserId::new();

        let mut uow = store.begin(&[key], Duration::from_secs(1)).await.unwrap();
        let first = append(uow.as_mut(), NewMovement::new(key, MovementType::In, 8, user), Utc::now())
            .await
            .unwrap();
        append(uow.as_mut(), NewMovement::new(key, MovementType::Sale, -2, user), Utc::now())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let ledger = MovementLedger::new(Arc::clone(&store), 1000);
        assert_eq!(ledger.get(first.id).await.unwrap(), first);
        assert!(matches!(
            ledger.get(MovementId::new()).await,
            Err(InventoryError::NotFound { entity: "movement", .. })
        ));

        let page = ledger
            .list(&MovementFilter::for_product(key.product_id), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.entries[0].movement_type, MovementType::Sale);

        let history = ledger.history(key.product_id).await.unwrap();
        assert_eq!(history[0].id, first.id);
    }
}

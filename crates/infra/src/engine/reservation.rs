//! Reservations and stock thresholds.
//!
//! Neither changes the on-hand quantity, so neither writes a ledger entry.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockroom_core::{InventoryError, InventoryResult, LocationId, ProductId, UserId};
use stockroom_events::{EventBus, InventoryNotification};
use stockroom_inventory::{plan_release, plan_reserve, InventoryRecord, StockKey, StockLevels};

use super::EngineContext;
use crate::catalog::Catalog;
use crate::register;
use crate::store::InventoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub user_id: UserId,
}

impl ReservationRequest {
    pub fn new(product_id: ProductId, location_id: LocationId, quantity: i64, user_id: UserId) -> Self {
        Self {
            product_id,
            location_id,
            quantity,
            user_id,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelsRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub reorder_level: i64,
    /// 0 = unbounded.
    pub max_level: i64,
}

#[derive(Debug, Clone)]
pub struct ReservationEngine<S, C, B> {
    ctx: EngineContext<S, C, B>,
}

impl<S, C, B> ReservationEngine<S, C, B>
where
    S: InventoryStore,
    C: Catalog,
    B: EventBus<InventoryNotification>,
{
    pub fn new(ctx: EngineContext<S, C, B>) -> Self {
        Self { ctx }
    }

    /// Hold `quantity` available units for an order.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            location_id = %request.location_id,
            user_id = %request.user_id,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn reserve(&self, request: ReservationRequest) -> InventoryResult<InventoryRecord> {
        let key = request.key();
        self.ctx.ensure_mutable(key).await?;

        let record = self
            .ctx
            .bounded(async {
                let mut uow = self.ctx.begin(&[key]).await?;
                let now = Utc::now();
                let current = register::load(uow.as_mut(), key, now).await?;
                let reserved = plan_reserve(&current, request.quantity)?;
                let record = register::put_reserved(uow.as_mut(), key, reserved, now).await?;
                uow.commit().await?;
                Ok::<_, InventoryError>(record)
            })
            .await?;

        info!(reserved = record.reserved_quantity, available = record.available(), "reservation committed");
        Ok(record)
    }

    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            location_id = %request.location_id,
            user_id = %request.user_id,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn release(&self, request: ReservationRequest) -> InventoryResult<InventoryRecord> {
        let key = request.key();
        self.ctx.ensure_mutable(key).await?;

        let record = self
            .ctx
            .bounded(async {
                let mut uow = self.ctx.begin(&[key]).await?;
                let now = Utc::now();
                let current = register::load(uow.as_mut(), key, now).await?;
                let reserved = plan_release(&current, request.quantity)?;
                let record = register::put_reserved(uow.as_mut(), key, reserved, now).await?;
                uow.commit().await?;
                Ok::<_, InventoryError>(record)
            })
            .await?;

        info!(reserved = record.reserved_quantity, available = record.available(), "release committed");
        Ok(record)
    }

    /// Configure reorder and maximum levels, creating the record if needed.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            location_id = %request.location_id,
            reorder_level = request.reorder_level,
            max_level = request.max_level
        ),
        err
    )]
    pub async fn set_levels(&self, request: LevelsRequest) -> InventoryResult<InventoryRecord> {
        let levels = StockLevels::new(request.reorder_level, request.max_level)?;
        let key = StockKey::new(request.product_id, request.location_id);
        self.ctx.ensure_mutable(key).await?;

        let record = self
            .ctx
            .bounded(async {
                let mut uow = self.ctx.begin(&[key]).await?;
                let record = register::put_levels(uow.as_mut(), key, levels, Utc::now()).await?;
                uow.commit().await?;
                Ok::<_, InventoryError>(record)
            })
            .await?;

        info!("stock levels updated");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AdjustRequest, AdjustmentEngine};
    use crate::testing::Fixture;
    use stockroom_inventory::AdjustmentKind;

    #[tokio::test]
    async fn reserve_and_release_track_available_stock() {
        let fx = Fixture::new();
        AdjustmentEngine::new(fx.ctx.clone())
            .adjust(AdjustRequest::new(fx.product, fx.loc1, AdjustmentKind::Increase, 10, fx.user))
            .await
            .unwrap();
        let engine = ReservationEngine::new(fx.ctx.clone());

        let held = engine
            .reserve(ReservationRequest::new(fx.product, fx.loc1, 7, fx.user))
            .await
            .unwrap();
        assert_eq!(held.available(), 3);

        let err = engine
            .reserve(ReservationRequest::new(fx.product, fx.loc1, 4, fx.user))
            .await
            .unwrap_err();
        assert_eq!(err, InventoryError::InsufficientStock { requested: 4, available: 3 });

        let err = engine
            .release(ReservationRequest::new(fx.product, fx.loc1, 8, fx.user))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity(_)));

        let released = engine
            .release(ReservationRequest::new(fx.product, fx.loc1, 7, fx.user))
            .await
            .unwrap();
        assert_eq!(released.reserved_quantity, 0);
        assert_eq!(fx.store.product_history(fx.product).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn levels_are_validated_and_create_the_record() {
        let fx = Fixture::new();
        let engine = ReservationEngine::new(fx.ctx.clone());

        let err = engine
            .set_levels(LevelsRequest {
                product_id: fx.product,
                location_id: fx.loc1,
                reorder_level: 10,
                max_level: 5,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidLevels(_)));

        let record = engine
            .set_levels(LevelsRequest {
                product_id: fx.product,
                location_id: fx.loc1,
                reorder_level: 5,
                max_level: 50,
            })
            .await
            .unwrap();
        assert_eq!((record.quantity, record.reorder_level, record.max_level), (0, 5, 50));
        assert!(fx.store.product_history(fx.product).await.unwrap().is_empty());
    }
}

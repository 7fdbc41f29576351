use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockroom_core::{InventoryError, InventoryResult, LocationId, MovementId, ProductId, ReferenceId, UserId};
use stockroom_events::{EventBus, InventoryNotification};
use stockroom_inventory::{
    plan_adjustment, plan_movement, AdjustmentKind, InventoryRecord, MovementEntry, MovementFilter, MovementType,
    NewMovement, StockKey,
};

use super::EngineContext;
use crate::catalog::Catalog;
use crate::store::{InventoryStore, Pagination};
use crate::{ledger, register};

/// Manual correction of one (product, location) quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub kind: AdjustmentKind,
    /// Amount to add/remove, or the absolute target for `Set`.
    pub magnitude: i64,
    pub user_id: UserId,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl AdjustRequest {
    pub fn new(product_id: ProductId, location_id: LocationId, kind: AdjustmentKind, magnitude: i64, user_id: UserId) -> Self {
        Self {
            product_id,
            location_id,
            kind,
            magnitude,
            user_id,
            reason: None,
            notes: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}

/// Receipt, issue, sale, return or write-off at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    /// One of IN, OUT, SALE, RETURN, DAMAGE.
    pub movement_type: MovementType,
    /// Positive amount; the sign comes from the movement type.
    pub quantity: i64,
    pub unit_cost: Option<i64>,
    pub reference_id: Option<ReferenceId>,
    pub user_id: UserId,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl MovementRequest {
    pub fn new(
        product_id: ProductId,
        location_id: LocationId,
        movement_type: MovementType,
        quantity: i64,
        user_id: UserId,
    ) -> Self {
        Self {
            product_id,
            location_id,
            movement_type,
            quantity,
            unit_cost: None,
            reference_id: None,
            user_id,
            reason: None,
            notes: None,
        }
    }

    pub fn with_unit_cost(mut self, unit_cost: i64) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn with_reference(mut self, reference_id: ReferenceId) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensateRequest {
    pub movement_id: MovementId,
    pub user_id: UserId,
    pub notes: Option<String>,
}

/// Result of a committed single-key change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustOutcome {
    pub old_quantity: i64,
    pub new_quantity: i64,
    /// The record as committed.
    pub record: InventoryRecord,
    /// `None` when the request changed nothing (a `Set` to the current quantity).
    pub movement: Option<MovementEntry>,
}

/// What an adjustment would produce against `record`, without touching any store.
///
/// Applies the same rules as [`AdjustmentEngine::adjust`]; the engine re-checks
/// them under lock, so a preview can go stale but never wrong in kind.
pub fn preview(record: &InventoryRecord, kind: AdjustmentKind, magnitude: i64) -> InventoryResult<i64> {
    Ok(plan_adjustment(record, kind, magnitude)?.new_quantity)
}

/// Single-key quantity changes: adjustments, typed movements, compensations.
#[derive(Debug, Clone)]
pub struct AdjustmentEngine<S, C, B> {
    ctx: EngineContext<S, C, B>,
}

impl<S, C, B> AdjustmentEngine<S, C, B>
where
    S: InventoryStore,
    C: Catalog,
    B: EventBus<InventoryNotification>,
{
    pub fn new(ctx: EngineContext<S, C, B>) -> Self {
        Self { ctx }
    }

    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            location_id = %request.location_id,
            kind = ?request.kind,
            magnitude = request.magnitude
        ),
        err
    )]
    pub async fn adjust(&self, request: AdjustRequest) -> InventoryResult<AdjustOutcome> {
        let key = request.key();
        self.ctx.ensure_mutable(key).await?;

        self.ctx
            .bounded(async {
                let mut uow = self.ctx.begin(&[key]).await?;
                let now = Utc::now();

                let current = register::load(uow.as_mut(), key, now).await?;
                let change = plan_adjustment(&current, request.kind, request.magnitude)?;

                if change.is_noop() {
                    uow.rollback().await?;
                    return Ok(AdjustOutcome {
                        old_quantity: change.old_quantity,
                        new_quantity: change.new_quantity,
                        record: current,
                        movement: None,
                    });
                }

                let record = register::upsert_quantity(uow.as_mut(), key, change.new_quantity, now).await?;
                let movement = ledger::append(
                    uow.as_mut(),
                    NewMovement::new(key, MovementType::Adjustment, change.delta(), request.user_id)
                        .with_reason(request.reason)
                        .with_notes(request.notes),
                    now,
                )
                .await?;
                uow.commit().await?;

                info!(
                    movement_id = %movement.id,
                    old_quantity = change.old_quantity,
                    new_quantity = change.new_quantity,
                    "adjustment committed"
                );
                self.ctx.notify_if_low(&record, now);

                Ok::<_, InventoryError>(AdjustOutcome {
                    old_quantity: change.old_quantity,
                    new_quantity: change.new_quantity,
                    record,
                    movement: Some(movement),
                })
            })
            .await
    }

    /// Record a typed movement. Decreases are bounded by available stock.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            location_id = %request.location_id,
            movement_type = %request.movement_type,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn record_movement(&self, request: MovementRequest) -> InventoryResult<AdjustOutcome> {
        if matches!(request.movement_type, MovementType::Adjustment | MovementType::Transfer) {
            return Err(InventoryError::invalid_movement(format!(
                "{} entries are written by the adjustment and transfer operations",
                request.movement_type
            )));
        }

        let key = request.key();
        self.ctx.ensure_mutable(key).await?;

        self.ctx
            .bounded(async {
                let mut uow = self.ctx.begin(&[key]).await?;
                let now = Utc::now();

                let current = register::load(uow.as_mut(), key, now).await?;
                let change = plan_movement(&current, request.movement_type, request.quantity)?;

                let record = register::upsert_quantity(uow.as_mut(), key, change.new_quantity, now).await?;
                let movement = ledger::append(
                    uow.as_mut(),
                    NewMovement::new(key, request.movement_type, change.delta(), request.user_id)
                        .with_unit_cost(request.unit_cost)
                        .with_reference(request.reference_id)
                        .with_reason(request.reason)
                        .with_notes(request.notes),
                    now,
                )
                .await?;
                uow.commit().await?;

                info!(
                    movement_id = %movement.id,
                    old_quantity = change.old_quantity,
                    new_quantity = change.new_quantity,
                    "movement committed"
                );
                self.ctx.notify_if_low(&record, now);

                Ok::<_, InventoryError>(AdjustOutcome {
                    old_quantity: change.old_quantity,
                    new_quantity: change.new_quantity,
                    record,
                    movement: Some(movement),
                })
            })
            .await
    }

    /// Append an ADJUSTMENT that cancels a committed entry.
    ///
    /// The original stays in the ledger and is compensated at most once; the
    /// check runs under the key lock, so racing callers cannot both succeed.
    /// Transfer legs cannot be compensated one at a time; move the stock back
    /// with a new transfer.
    #[instrument(skip(self, request), fields(movement_id = %request.movement_id), err)]
    pub async fn compensate(&self, request: CompensateRequest) -> InventoryResult<AdjustOutcome> {
        let original = self
            .ctx
            .store
            .movement(request.movement_id)
            .await?
            .ok_or_else(|| InventoryError::not_found("movement", request.movement_id))?;
        let correction = original.compensation(request.user_id, request.notes.as_deref())?;

        let key = original.key();
        self.ctx.ensure_mutable(key).await?;

        self.ctx
            .bounded(async {
                let mut uow = self.ctx.begin(&[key]).await?;
                let now = Utc::now();

                // Every compensation of `original` is written under this key's lock.
                let earlier = self
                    .ctx
                    .store
                    .movements(
                        &MovementFilter {
                            compensates: Some(original.id),
                            ..MovementFilter::for_key(key)
                        },
                        Pagination { limit: 1, offset: 0 },
                    )
                    .await?;
                if let Some(existing) = earlier.entries.first() {
                    return Err(InventoryError::invalid_movement(format!(
                        "movement {} was already compensated by {}",
                        original.id, existing.id
                    )));
                }

                let current = register::load(uow.as_mut(), key, now).await?;
                let new_quantity = current
                    .quantity
                    .checked_add(correction.quantity)
                    .ok_or_else(|| InventoryError::invalid_quantity("quantity overflows"))?;

                let record = register::upsert_quantity(uow.as_mut(), key, new_quantity, now).await?;
                let movement = ledger::append(uow.as_mut(), correction, now).await?;
                uow.commit().await?;

                info!(
                    compensating_id = %movement.id,
                    old_quantity = current.quantity,
                    new_quantity,
                    "compensation committed"
                );
                self.ctx.notify_if_low(&record, now);

                Ok::<_, InventoryError>(AdjustOutcome {
                    old_quantity: current.quantity,
                    new_quantity,
                    record,
                    movement: Some(movement),
                })
            })
            .await
    }
}

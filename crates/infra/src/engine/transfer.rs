use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockroom_core::{InventoryError, InventoryResult, LocationId, ProductId, ReferenceId, UserId};
use stockroom_events::{EventBus, InventoryNotification};
use stockroom_inventory::{
    plan_transfer, validate_transfer, InventoryRecord, MovementEntry, MovementType, NewMovement, StockKey,
};

use super::EngineContext;
use crate::catalog::Catalog;
use crate::store::InventoryStore;
use crate::{ledger, register};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub quantity: i64,
    pub user_id: UserId,
    pub notes: Option<String>,
}

impl TransferRequest {
    pub fn new(
        product_id: ProductId,
        from_location: LocationId,
        to_location: LocationId,
        quantity: i64,
        user_id: UserId,
    ) -> Self {
        Self {
            product_id,
            from_location,
            to_location,
            quantity,
            user_id,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Both sides of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Shared by the two ledger entries.
    pub reference_id: ReferenceId,
    pub source: InventoryRecord,
    pub destination: InventoryRecord,
    pub outgoing: MovementEntry,
    pub incoming: MovementEntry,
}

/// Moves stock of one product between two locations.
#[derive(Debug, Clone)]
pub struct TransferEngine<S, C, B> {
    ctx: EngineContext<S, C, B>,
}

impl<S, C, B> TransferEngine<S, C, B>
where
    S: InventoryStore,
    C: Catalog,
    B: EventBus<InventoryNotification>,
{
    pub fn new(ctx: EngineContext<S, C, B>) -> Self {
        Self { ctx }
    }

    /// Both keys are locked in one unit of work, in lock order; either both
    /// sides move or neither does.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            from = %request.from_location,
            to = %request.to_location,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn transfer(&self, request: TransferRequest) -> InventoryResult<TransferOutcome> {
        validate_transfer(request.from_location, request.to_location, request.quantity)?;

        let source_key = StockKey::new(request.product_id, request.from_location);
        let destination_key = StockKey::new(request.product_id, request.to_location);
        self.ctx.ensure_mutable(source_key).await?;
        self.ctx.catalog.require_active_location(destination_key.location_id).await?;

        self.ctx
            .bounded(async {
                let mut uow = self.ctx.begin(&[source_key, destination_key]).await?;
                let now = Utc::now();

                let source = register::load(uow.as_mut(), source_key, now).await?;
                let destination = register::load(uow.as_mut(), destination_key, now).await?;
                let plan = plan_transfer(&source, &destination, request.quantity)?;

                let reference_id = ReferenceId::new();
                let source = register::upsert_quantity(uow.as_mut(), source_key, plan.source.new_quantity, now).await?;
                let destination =
                    register::upsert_quantity(uow.as_mut(), destination_key, plan.destination.new_quantity, now).await?;

                let outgoing = ledger::append(
                    uow.as_mut(),
                    NewMovement::new(source_key, MovementType::Transfer, -plan.quantity, request.user_id)
                        .with_reference(Some(reference_id))
                        .with_notes(request.notes.clone()),
                    now,
                )
                .await?;
                let incoming = ledger::append(
                    uow.as_mut(),
                    NewMovement::new(destination_key, MovementType::Transfer, plan.quantity, request.user_id)
                        .with_reference(Some(reference_id))
                        .with_notes(request.notes),
                    now,
                )
                .await?;
                uow.commit().await?;

                info!(
                    reference_id = %reference_id,
                    source_quantity = source.quantity,
                    destination_quantity = destination.quantity,
                    "transfer committed"
                );
                self.ctx.notify_if_low(&source, now);

                Ok::<_, InventoryError>(TransferOutcome {
                    reference_id,
                    source,
                    destination,
                    outgoing,
                    incoming,
                })
            })
            .await
    }
}

//! Mutating engines.
//!
//! Each operation runs the same shape: catalog checks, lock every touched key
//! in lock order, read, validate with the pure planners from
//! `stockroom-inventory`, stage register and ledger writes, commit. Everything
//! from the first lock to the commit runs under one deadline (the configured
//! lock timeout), so a stalled store fails with a retryable `LockTimeout`
//! instead of holding its locks.
//!
//! Any failure before the commit drops the unit of work, which rolls it back;
//! a caller that drops the future gets the same result. Low-stock
//! notifications go out only after a successful commit.

pub mod adjustment;
pub mod reservation;
pub mod transfer;

pub use adjustment::{preview, AdjustOutcome, AdjustRequest, AdjustmentEngine, CompensateRequest, MovementRequest};
pub use reservation::{LevelsRequest, ReservationEngine, ReservationRequest};
pub use transfer::{TransferEngine, TransferOutcome, TransferRequest};

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use stockroom_core::{InventoryError, InventoryResult};
use stockroom_events::{EventBus, InventoryNotification, LowStockAlert};
use stockroom_inventory::{InventoryRecord, StockKey};

use crate::catalog::Catalog;
use crate::store::{InventoryStore, UnitOfWork};

/// Collaborators shared by every engine.
///
/// Stateless apart from the handles it carries; clone it freely (wrap the
/// collaborators in `Arc` to share one store across engines).
#[derive(Debug, Clone)]
pub struct EngineContext<S, C, B> {
    pub store: S,
    pub catalog: C,
    pub bus: B,
    pub lock_timeout: Duration,
}

impl<S, C, B> EngineContext<S, C, B>
where
    S: InventoryStore,
    C: Catalog,
    B: EventBus<InventoryNotification>,
{
    pub fn new(store: S, catalog: C, bus: B, lock_timeout: Duration) -> Self {
        Self {
            store,
            catalog,
            bus,
            lock_timeout,
        }
    }

    /// The product must exist and the location must exist and be active.
    pub(crate) async fn ensure_mutable(&self, key: StockKey) -> InventoryResult<()> {
        self.catalog.require_product(key.product_id).await?;
        self.catalog.require_active_location(key.location_id).await?;
        Ok(())
    }

    pub(crate) async fn begin(&self, keys: &[StockKey]) -> InventoryResult<Box<dyn UnitOfWork>> {
        Ok(self.store.begin(keys, self.lock_timeout).await?)
    }

    /// Run one unit of work, from `begin` to `commit`, under the lock budget.
    ///
    /// On expiry `work` is dropped mid-flight, taking its unit of work (and
    /// locks) with it.
    pub(crate) async fn bounded<T>(
        &self,
        work: impl Future<Output = InventoryResult<T>>,
    ) -> InventoryResult<T> {
        tokio::time::timeout(self.lock_timeout, work).await.map_err(|_| {
            InventoryError::lock_timeout(format!("unit of work exceeded {:?}", self.lock_timeout))
        })?
    }

    /// Publish a low-stock alert if `record` sits at or below its reorder level.
    ///
    /// Best effort: a failed publish is logged and otherwise ignored.
    pub(crate) fn notify_if_low(&self, record: &InventoryRecord, at: DateTime<Utc>) {
        if !record.needs_reorder() {
            return;
        }
        let alert = LowStockAlert {
            product_id: record.product_id,
            location_id: record.location_id,
            quantity: record.quantity,
            available: record.available(),
            reorder_level: record.reorder_level,
            occurred_at: at,
        };
        let notification = InventoryNotification::LowStock(alert);
        let kind = notification.kind();
        match self.bus.publish(notification) {
            Ok(()) => debug!(key = %record.key(), quantity = record.quantity, kind, "notification published"),
            Err(err) => warn!(
                key = %record.key(),
                quantity = record.quantity,
                kind,
                error = ?err,
                "failed to publish notification"
            ),
        }
    }
}

//! Single entry point over the register, ledger, engines and reports.

use std::sync::Arc;

use stockroom_core::{InventoryResult, LocationId, MovementId, ProductId};
use stockroom_events::{EventBus, InventoryNotification};
use stockroom_inventory::{AdjustmentKind, Discrepancy, InventoryRecord, MovementEntry, MovementFilter, StockKey};

use crate::catalog::Catalog;
use crate::config::InventoryConfig;
use crate::engine::{
    preview, AdjustOutcome, AdjustRequest, AdjustmentEngine, CompensateRequest, EngineContext, LevelsRequest,
    MovementRequest, ReservationEngine, ReservationRequest, TransferEngine, TransferOutcome, TransferRequest,
};
use crate::ledger::MovementLedger;
use crate::register::QuantityRegister;
use crate::reporting::{LocationSummary, Reporting};
use crate::retry::retry_on_lock_timeout;
use crate::store::{InventoryStore, MovementPage, Pagination};

/// Inventory service.
///
/// Mutations are retried on lock timeouts according to `config.retry`; every
/// other error is returned as is. Cloning is cheap.
#[derive(Debug)]
pub struct InventoryService<S, C, B> {
    config: InventoryConfig,
    register: QuantityRegister<Arc<S>>,
    ledger: MovementLedger<Arc<S>>,
    reporting: Reporting<Arc<S>>,
    adjustments: AdjustmentEngine<Arc<S>, Arc<C>, Arc<B>>,
    transfers: TransferEngine<Arc<S>, Arc<C>, Arc<B>>,
    reservations: ReservationEngine<Arc<S>, Arc<C>, Arc<B>>,
}

impl<S, C, B> Clone for InventoryService<S, C, B> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            register: self.register.clone(),
            ledger: self.ledger.clone(),
            reporting: self.reporting.clone(),
            adjustments: self.adjustments.clone(),
            transfers: self.transfers.clone(),
            reservations: self.reservations.clone(),
        }
    }
}

impl<S, C, B> InventoryService<S, C, B>
where
    S: InventoryStore + 'static,
    C: Catalog + 'static,
    B: EventBus<InventoryNotification> + 'static,
{
    pub fn new(store: Arc<S>, catalog: Arc<C>, bus: Arc<B>, config: InventoryConfig) -> Self {
        let ctx = EngineContext::new(Arc::clone(&store), catalog, bus, config.lock_timeout);
        Self {
            register: QuantityRegister::new(Arc::clone(&store)),
            ledger: MovementLedger::new(Arc::clone(&store), config.max_page_size),
            reporting: Reporting::new(store, config.max_page_size),
            adjustments: AdjustmentEngine::new(ctx.clone()),
            transfers: TransferEngine::new(ctx.clone()),
            reservations: ReservationEngine::new(ctx),
            config,
        }
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub async fn adjust(&self, request: AdjustRequest) -> InventoryResult<AdjustOutcome> {
        retry_on_lock_timeout(&self.config.retry, || self.adjustments.adjust(request.clone())).await
    }

    pub async fn record_movement(&self, request: MovementRequest) -> InventoryResult<AdjustOutcome> {
        retry_on_lock_timeout(&self.config.retry, || self.adjustments.record_movement(request.clone())).await
    }

    pub async fn compensate(&self, request: CompensateRequest) -> InventoryResult<AdjustOutcome> {
        retry_on_lock_timeout(&self.config.retry, || self.adjustments.compensate(request.clone())).await
    }

    pub async fn transfer(&self, request: TransferRequest) -> InventoryResult<TransferOutcome> {
        retry_on_lock_timeout(&self.config.retry, || self.transfers.transfer(request.clone())).await
    }

    pub async fn reserve(&self, request: ReservationRequest) -> InventoryResult<InventoryRecord> {
        retry_on_lock_timeout(&self.config.retry, || self.reservations.reserve(request.clone())).await
    }

    pub async fn release(&self, request: ReservationRequest) -> InventoryResult<InventoryRecord> {
        retry_on_lock_timeout(&self.config.retry, || self.reservations.release(request.clone())).await
    }

    pub async fn set_levels(&self, request: LevelsRequest) -> InventoryResult<InventoryRecord> {
        retry_on_lock_timeout(&self.config.retry, || self.reservations.set_levels(request.clone())).await
    }

    /// The quantity an adjustment would produce against committed state.
    pub async fn preview(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        kind: AdjustmentKind,
        magnitude: i64,
    ) -> InventoryResult<i64> {
        let key = StockKey::new(product_id, location_id);
        let current = self
            .register
            .get(product_id, location_id)
            .await?
            .unwrap_or_else(|| InventoryRecord::empty(key, chrono::Utc::now()));
        preview(&current, kind, magnitude)
    }

    pub async fn get(&self, product_id: ProductId, location_id: LocationId) -> InventoryResult<Option<InventoryRecord>> {
        self.register.get(product_id, location_id).await
    }

    pub async fn get_all(&self, product_id: ProductId) -> InventoryResult<Vec<InventoryRecord>> {
        self.register.get_all(product_id).await
    }

    pub async fn movement(&self, id: MovementId) -> InventoryResult<MovementEntry> {
        self.ledger.get(id).await
    }

    pub async fn total_stock(&self, product_id: ProductId) -> InventoryResult<i64> {
        self.reporting.total_stock(product_id).await
    }

    pub async fn low_stock(&self) -> InventoryResult<Vec<InventoryRecord>> {
        self.reporting.low_stock().await
    }

    pub async fn zero_stock(&self) -> InventoryResult<Vec<InventoryRecord>> {
        self.reporting.zero_stock().await
    }

    pub async fn location_summary(&self, location_id: LocationId) -> InventoryResult<LocationSummary> {
        self.reporting.location_summary(location_id).await
    }

    pub async fn location_summaries(&self) -> InventoryResult<Vec<LocationSummary>> {
        self.reporting.location_summaries().await
    }

    /// Filtered ledger, newest first; `page = None` uses the configured page size.
    pub async fn movement_history(&self, filter: &MovementFilter, page: Option<Pagination>) -> InventoryResult<MovementPage> {
        let page = page.unwrap_or_else(|| self.config.page(None, None));
        self.reporting.movement_history(filter, page).await
    }

    pub async fn reconcile(&self, product_id: ProductId) -> InventoryResult<Vec<Discrepancy>> {
        self.reporting.reconcile(product_id).await
    }
}

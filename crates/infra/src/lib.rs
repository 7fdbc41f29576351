//! Infrastructure layer: transactional stores, engines, reports and wiring.
//!
//! The pure inventory rules live in `stockroom-inventory`; this crate runs them
//! against a [`store::InventoryStore`] under per-key locks and publishes
//! notifications on a `stockroom-events` bus.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod register;
pub mod reporting;
pub mod retry;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, InMemoryCatalog, Location, PostgresCatalog, Product};
pub use config::{ConfigError, InventoryConfig};
pub use engine::{
    AdjustOutcome, AdjustRequest, AdjustmentEngine, CompensateRequest, EngineContext, LevelsRequest,
    MovementRequest, ReservationEngine, ReservationRequest, TransferEngine, TransferOutcome, TransferRequest,
};
pub use ledger::MovementLedger;
pub use register::QuantityRegister;
pub use reporting::{LocationSummary, Reporting};
pub use retry::{retry_on_lock_timeout, BackoffStrategy, RetryPolicy};
pub use service::InventoryService;
pub use store::{
    InMemoryInventoryStore, InventoryStore, MovementPage, Pagination, PostgresInventoryStore, StoreError,
    UnitOfWork,
};

//! Inventory domain module.
//!
//! Business rules for the multi-location stock register and movement ledger,
//! implemented as deterministic domain logic (no IO, no locking, no storage).

pub mod adjustment;
pub mod movement;
pub mod record;
pub mod replay;
pub mod reservation;
pub mod transfer;

pub use adjustment::{plan_adjustment, plan_movement, AdjustmentKind, QuantityChange};
pub use movement::{MovementEntry, MovementFilter, MovementType, NewMovement, QuantitySign, SignRule};
pub use record::{lock_order, InventoryRecord, StockKey, StockLevels};
pub use replay::{ledger_balances, reconcile, replay_quantity, Discrepancy};
pub use reservation::{plan_release, plan_reserve};
pub use transfer::{plan_transfer, validate_transfer, TransferPlan};

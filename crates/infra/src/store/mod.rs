//! Transactional store boundary for the quantity register and movement ledger.
//!
//! Engines talk to a [`InventoryStore`]; every write goes through a key-locked
//! [`UnitOfWork`]. Two implementations are provided: an in-memory store for
//! tests and single-process tools, and a Postgres store.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use query::{MovementPage, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use r#trait::{InventoryStore, StoreError, UnitOfWork};

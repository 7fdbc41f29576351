//! Identifiers and the error taxonomy shared by every `stockroom-*` crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{InventoryError, InventoryResult};
pub use id::{LocationId, MovementId, ProductId, ReferenceId, UserId};

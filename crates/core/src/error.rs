//! Inventory error model.

use thiserror::Error;

use crate::id::LocationId;

/// Result type used across the inventory core.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Inventory-level error.
///
/// Every invariant violation is detected before anything is written, so any of
/// these (apart from the store variants) means the unit of work changed nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Unknown product, location or ledger entry.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A magnitude was zero/negative where a positive amount is required.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// The on-hand quantity would drop below zero.
    #[error("quantity cannot be negative (got {quantity})")]
    NegativeQuantity { quantity: i64 },

    /// The on-hand quantity would drop below what is already reserved.
    #[error("reserved quantity {reserved} exceeds quantity {quantity}")]
    ReservedExceedsQuantity { quantity: i64, reserved: i64 },

    /// A decrease or transfer asks for more than is available.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("source and destination are the same location: {0}")]
    SameLocation(LocationId),

    #[error("location is inactive: {0}")]
    LocationInactive(LocationId),

    /// A ledger entry is malformed or cannot be used for the requested operation.
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    #[error("invalid stock levels: {0}")]
    InvalidLevels(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The per-key lock could not be acquired in time. Safe to retry.
    #[error("lock timeout: {0}")]
    LockTimeout(String),

    /// Underlying transactional store failure.
    #[error("store error: {message}")]
    Store { message: String, retryable: bool },
}

impl InventoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_movement(msg: impl Into<String>) -> Self {
        Self::InvalidMovement(msg.into())
    }

    pub fn invalid_levels(msg: impl Into<String>) -> Self {
        Self::InvalidLevels(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn lock_timeout(msg: impl Into<String>) -> Self {
        Self::LockTimeout(msg.into())
    }

    pub fn store(msg: impl Into<String>, retryable: bool) -> Self {
        Self::Store {
            message: msg.into(),
            retryable,
        }
    }

    /// Whether a caller may retry the same request automatically (with backoff).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout(_) => true,
            Self::Store { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lock_timeouts_and_flagged_store_errors_are_retryable() {
        assert!(InventoryError::lock_timeout("busy").is_retryable());
        assert!(InventoryError::store("serialization failure", true).is_retryable());
        assert!(!InventoryError::store("disk full", false).is_retryable());
        assert!(!InventoryError::invalid_quantity("zero").is_retryable());
        assert!(!InventoryError::InsufficientStock { requested: 5, available: 1 }.is_retryable());
    }

    #[test]
    fn messages_carry_context() {
        let err = InventoryError::ReservedExceedsQuantity { quantity: 3, reserved: 5 };
        assert_eq!(err.to_string(), "reserved quantity 5 exceeds quantity 3");

        let err = InventoryError::not_found("product", "abc");
        assert_eq!(err.to_string(), "product not found: abc");
    }
}

use serde::{Deserialize, Serialize};

use stockroom_core::{InventoryError, InventoryResult, LocationId};

use crate::adjustment::QuantityChange;
use crate::record::InventoryRecord;

/// Checks that need no stored state: distinct locations, positive quantity.
pub fn validate_transfer(from: LocationId, to: LocationId, quantity: i64) -> InventoryResult<()> {
    if from == to {
        return Err(InventoryError::SameLocation(from));
    }
    if quantity <= 0 {
        return Err(InventoryError::invalid_quantity(format!(
            "transfer quantity must be positive (got {quantity})"
        )));
    }
    Ok(())
}

/// Both sides of a planned transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    pub quantity: i64,
    pub source: QuantityChange,
    pub destination: QuantityChange,
}

/// Plan moving `quantity` units from `source` to `destination`.
///
/// Only available (unreserved) stock at the source can be moved.
pub fn plan_transfer(
    source: &InventoryRecord,
    destination: &InventoryRecord,
    quantity: i64,
) -> InventoryResult<TransferPlan> {
    validate_transfer(source.location_id, destination.location_id, quantity)?;

    if source.product_id != destination.product_id {
        return Err(InventoryError::invalid_movement(
            "transfer source and destination must hold the same product",
        ));
    }

    if source.available() < quantity {
        return Err(InventoryError::InsufficientStock {
            requested: quantity,
            available: source.available(),
        });
    }

    let destination_quantity = destination
        .quantity
        .checked_add(quantity)
        .ok_or_else(|| InventoryError::invalid_quantity("destination quantity overflows"))?;

    Ok(TransferPlan {
        quantity,
        source: QuantityChange {
            old_quantity: source.quantity,
            new_quantity: source.quantity - quantity,
        },
        destination: QuantityChange {
            old_quantity: destination.quantity,
            new_quantity: destination_quantity,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StockKey;
    use chrono::Utc;
    use stockroom_core::ProductId;

    fn at(product: ProductId, quantity: i64, reserved: i64) -> InventoryRecord {
        InventoryRecord {
            quantity,
            reserved_quantity: reserved,
            ..InventoryRecord::empty(StockKey::new(product, LocationId::new()), Utc::now())
        }
    }

    #[test]
    fn moves_units_between_locations() {
        let product = ProductId::new();
        let plan = plan_transfer(&at(product, 10, 0), &at(product, 0, 0), 4).unwrap();
        assert_eq!(plan.source.new_quantity, 6);
        assert_eq!(plan.destination.new_quantity, 4);
        assert_eq!(plan.source.delta() + plan.destination.delta(), 0);
    }

    #[test]
    fn same_location_is_rejected_first() {
        let loc = LocationId::new();
        assert_eq!(validate_transfer(loc, loc, 0), Err(InventoryError::SameLocation(loc)));
    }

    #[test]
    fn reserved_units_cannot_move() {
        let product = ProductId::new();
        let err = plan_transfer(&at(product, 10, 7), &at(product, 0, 0), 4).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                requested: 4,
                available: 3
            }
        );
    }

    #[test]
    fn product_mismatch_is_rejected() {
        let err = plan_transfer(&at(ProductId::new(), 10, 0), &at(ProductId::new(), 0, 0), 1).unwrap_err();
        assert!(matches!(err, InventoryError::InvalidMovement(_)));
    }
}

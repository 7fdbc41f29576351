use stockroom_core::{InventoryError, InventoryResult};

use crate::record::InventoryRecord;

/// New reserved quantity after holding `quantity` more units.
pub fn plan_reserve(record: &InventoryRecord, quantity: i64) -> InventoryResult<i64> {
    if quantity <= 0 {
        return Err(InventoryError::invalid_quantity(format!(
            "reservation must be positive (got {quantity})"
        )));
    }
    if record.available() < quantity {
        return Err(InventoryError::InsufficientStock {
            requested: quantity,
            available: record.available(),
        });
    }
    Ok(record.reserved_quantity + quantity)
}

/// New reserved quantity after letting go of `quantity` held units.
pub fn plan_release(record: &InventoryRecord, quantity: i64) -> InventoryResult<i64> {
    if quantity <= 0 {
        return Err(InventoryError::invalid_quantity(format!(
            "release must be positive (got {quantity})"
        )));
    }
    if record.reserved_quantity < quantity {
        return Err(InventoryError::invalid_quantity(format!(
            "cannot release {quantity}, only {} reserved",
            record.reserved_quantity
        )));
    }
    Ok(record.reserved_quantity - quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StockKey;
    use chrono::Utc;
    use stockroom_core::{LocationId, ProductId};

    fn record(quantity: i64, reserved: i64) -> InventoryRecord {
        InventoryRecord {
            quantity,
            reserved_quantity: reserved,
            ..InventoryRecord::empty(StockKey::new(ProductId::new(), LocationId::new()), Utc::now())
        }
    }

    #[test]
    fn reserve_up_to_available() {
        assert_eq!(plan_reserve(&record(5, 2), 3), Ok(5));
        assert!(matches!(
            plan_reserve(&record(5, 2), 4),
            Err(InventoryError::InsufficientStock { requested: 4, available: 3 })
        ));
    }

    #[test]
    fn release_cannot_exceed_reserved() {
        assert_eq!(plan_release(&record(5, 2), 2), Ok(0));
        assert!(matches!(plan_release(&record(5, 2), 3), Err(InventoryError::InvalidQuantity(_))));
    }
}

//! Pure decision logic for single-key quantity changes.
//!
//! Everything here is deterministic and side-effect free, so UI layers can use
//! the same functions to preview a change before submitting it. The engine in
//! `stockroom-infra` runs them again under lock and stays the only authority
//! for committed values.

use serde::{Deserialize, Serialize};

use stockroom_core::{InventoryError, InventoryResult};

use crate::movement::MovementType;
use crate::record::InventoryRecord;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Increase,
    Decrease,
    Set,
}

impl AdjustmentKind {
    /// Target quantity for `magnitude` applied to `current`.
    pub fn apply(self, current: i64, magnitude: i64) -> InventoryResult<i64> {
        let next = match self {
            AdjustmentKind::Increase | AdjustmentKind::Decrease if magnitude <= 0 => {
                return Err(InventoryError::invalid_quantity(format!(
                    "adjustment magnitude must be positive (got {magnitude})"
                )));
            }
            AdjustmentKind::Set if magnitude < 0 => {
                return Err(InventoryError::invalid_quantity(format!(
                    "cannot set quantity to {magnitude}"
                )));
            }
            AdjustmentKind::Increase => current
                .checked_add(magnitude)
                .ok_or_else(|| InventoryError::invalid_quantity("quantity overflows"))?,
            AdjustmentKind::Decrease => current - magnitude,
            AdjustmentKind::Set => magnitude,
        };

        if next < 0 {
            return Err(InventoryError::invalid_quantity(format!(
                "cannot decrease {current} by {magnitude}"
            )));
        }
        Ok(next)
    }
}

/// Outcome of planning a change against a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityChange {
    pub old_quantity: i64,
    pub new_quantity: i64,
}

impl QuantityChange {
    /// Signed ledger quantity for this change.
    pub fn delta(&self) -> i64 {
        self.new_quantity - self.old_quantity
    }

    pub fn is_noop(&self) -> bool {
        self.delta() == 0
    }
}

/// Plan a manual adjustment (increase / decrease / set) of `record`.
pub fn plan_adjustment(
    record: &InventoryRecord,
    kind: AdjustmentKind,
    magnitude: i64,
) -> InventoryResult<QuantityChange> {
    let new_quantity = kind.apply(record.quantity, magnitude)?;

    if new_quantity < record.reserved_quantity {
        return Err(InventoryError::ReservedExceedsQuantity {
            quantity: new_quantity,
            reserved: record.reserved_quantity,
        });
    }

    Ok(QuantityChange {
        old_quantity: record.quantity,
        new_quantity,
    })
}

/// Plan a typed stock movement (receipt, issue, sale, return, write-off).
///
/// Decreases are bounded by what is available: reserved stock cannot be sold
/// or written off from under its reservation.
pub fn plan_movement(
    record: &InventoryRecord,
    movement_type: MovementType,
    magnitude: i64,
) -> InventoryResult<QuantityChange> {
    let delta = movement_type.signed(magnitude)?;

    if delta < 0 && record.available() < magnitude {
        return Err(InventoryError::InsufficientStock {
            requested: magnitude,
            available: record.available(),
        });
    }

    let new_quantity = record
        .quantity
        .checked_add(delta)
        .ok_or_else(|| InventoryError::invalid_quantity("quantity overflows"))?;

    Ok(QuantityChange {
        old_quantity: record.quantity,
        new_quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StockKey;
    use chrono::Utc;
    use proptest::prelude::*;
    use stockroom_core::{LocationId, ProductId};

    fn record(quantity: i64, reserved: i64) -> InventoryRecord {
        InventoryRecord {
            quantity,
            reserved_quantity: reserved,
            ..InventoryRecord::empty(StockKey::new(ProductId::new(), LocationId::new()), Utc::now())
        }
    }

    #[test]
    fn increase_from_empty() {
        let change = plan_adjustment(&record(0, 0), AdjustmentKind::Increase, 10).unwrap();
        assert_eq!(change, QuantityChange { old_quantity: 0, new_quantity: 10 });
        assert_eq!(change.delta(), 10);
    }

    #[test]
    fn decrease_below_zero_is_invalid_quantity() {
        let err = plan_adjustment(&record(3, 0), AdjustmentKind::Decrease, 4).unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity(_)));
    }

    #[test]
    fn non_positive_magnitude_is_rejected_for_relative_kinds() {
        for kind in [AdjustmentKind::Increase, AdjustmentKind::Decrease] {
            assert!(matches!(
                plan_adjustment(&record(5, 0), kind, 0),
                Err(InventoryError::InvalidQuantity(_))
            ));
            assert!(matches!(
                plan_adjustment(&record(5, 0), kind, -2),
                Err(InventoryError::InvalidQuantity(_))
            ));
        }
    }

    #[test]
    fn set_to_zero_is_allowed() {
        let change = plan_adjustment(&record(7, 0), AdjustmentKind::Set, 0).unwrap();
        assert_eq!(change.new_quantity, 0);
        assert_eq!(change.delta(), -7);
    }

    #[test]
    fn set_below_reserved_is_rejected() {
        let err = plan_adjustment(&record(5, 5), AdjustmentKind::Set, 3).unwrap_err();
        assert_eq!(
            err,
            InventoryError::ReservedExceedsQuantity {
                quantity: 3,
                reserved: 5
            }
        );
    }

    #[test]
    fn set_to_current_is_a_noop() {
        let change = plan_adjustment(&record(4, 1), AdjustmentKind::Set, 4).unwrap();
        assert!(change.is_noop());
    }

    #[test]
    fn sale_is_bounded_by_available() {
        let err = plan_movement(&record(10, 8), MovementType::Sale, 3).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                requested: 3,
                available: 2
            }
        );

        let change = plan_movement(&record(10, 8), MovementType::Sale, 2).unwrap();
        assert_eq!(change.new_quantity, 8);
    }

    #[test]
    fn receipt_ignores_reservations() {
        let change = plan_movement(&record(5, 5), MovementType::In, 3).unwrap();
        assert_eq!(change.delta(), 3);
    }

    #[test]
    fn adjustment_type_is_not_a_typed_movement() {
        assert!(matches!(
            plan_movement(&record(5, 0), MovementType::Adjustment, 1),
            Err(InventoryError::InvalidMovement(_))
        ));
    }

    proptest! {
        /// Property: any accepted adjustment leaves the record within its invariants.
        #[test]
        fn accepted_adjustments_preserve_invariants(
            quantity in 0i64..1_000,
            reserved_pct in 0i64..=100,
            kind in prop_oneof![
                Just(AdjustmentKind::Increase),
                Just(AdjustmentKind::Decrease),
                Just(AdjustmentKind::Set),
            ],
            magnitude in -50i64..1_500,
        ) {
            let reserved = quantity * reserved_pct / 100;
            let r = record(quantity, reserved);

            if let Ok(change) = plan_adjustment(&r, kind, magnitude) {
                let next = r.with_quantity(change.new_quantity, Utc::now());
                prop_assert!(next.is_ok());
                prop_assert_eq!(change.old_quantity + change.delta(), change.new_quantity);
            }
        }

        /// Property: planning is deterministic and never mutates its input.
        #[test]
        fn planning_is_pure(quantity in 0i64..1_000, magnitude in 1i64..1_000) {
            let r = record(quantity, 0);
            let before = r.clone();
            let a = plan_adjustment(&r, AdjustmentKind::Decrease, magnitude);
            let b = plan_adjustment(&r, AdjustmentKind::Decrease, magnitude);
            prop_assert_eq!(a, b);
            prop_assert_eq!(r, before);
        }
    }
}

//! Ledger entries: the immutable record of every quantity-affecting event.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    InventoryError, InventoryResult, LocationId, MovementId, ProductId, ReferenceId, UserId,
};

use crate::record::StockKey;

/// Why a quantity changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Transfer,
    Adjustment,
    Sale,
    Return,
    Damage,
}

/// Which signs a movement type may carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignRule {
    Positive,
    Negative,
    Either,
}

impl MovementType {
    pub const ALL: [MovementType; 7] = [
        MovementType::In,
        MovementType::Out,
        MovementType::Transfer,
        MovementType::Adjustment,
        MovementType::Sale,
        MovementType::Return,
        MovementType::Damage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Transfer => "TRANSFER",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Sale => "SALE",
            MovementType::Return => "RETURN",
            MovementType::Damage => "DAMAGE",
        }
    }

    pub fn sign_rule(self) -> SignRule {
        match self {
            MovementType::In | MovementType::Return => SignRule::Positive,
            MovementType::Out | MovementType::Sale | MovementType::Damage => SignRule::Negative,
            MovementType::Transfer | MovementType::Adjustment => SignRule::Either,
        }
    }

    /// Signed ledger quantity for a positive `magnitude` of a fixed-direction type.
    ///
    /// ADJUSTMENT and TRANSFER have no fixed direction and go through their own engines.
    pub fn signed(self, magnitude: i64) -> InventoryResult<i64> {
        if magnitude <= 0 {
            return Err(InventoryError::invalid_quantity(format!(
                "{} quantity must be positive (got {magnitude})",
                self.as_str()
            )));
        }
        match self.sign_rule() {
            SignRule::Positive => Ok(magnitude),
            SignRule::Negative => Ok(-magnitude),
            SignRule::Either => Err(InventoryError::invalid_movement(format!(
                "{} movements have no fixed direction",
                self.as_str()
            ))),
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| InventoryError::invalid_movement(format!("unknown movement type '{s}'")))
    }
}

/// A movement about to be appended (id and timestamp not yet assigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub movement_type: MovementType,
    /// Positive = increase, negative = decrease.
    pub quantity: i64,
    /// Minor currency units per unit.
    pub unit_cost: Option<i64>,
    pub user_id: UserId,
    pub reference_id: Option<ReferenceId>,
    /// The entry this one cancels, for compensating adjustments.
    pub compensates: Option<MovementId>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl NewMovement {
    pub fn new(key: StockKey, movement_type: MovementType, quantity: i64, user_id: UserId) -> Self {
        Self {
            product_id: key.product_id,
            location_id: key.location_id,
            movement_type,
            quantity,
            unit_cost: None,
            user_id,
            reference_id: None,
            compensates: None,
            reason: None,
            notes: None,
        }
    }

    pub fn with_unit_cost(mut self, unit_cost: Option<i64>) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn with_reference(mut self, reference_id: Option<ReferenceId>) -> Self {
        self.reference_id = reference_id;
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    pub fn validate(&self) -> InventoryResult<()> {
        if self.quantity == 0 {
            return Err(InventoryError::invalid_quantity("movement quantity cannot be zero"));
        }
        let sign_ok = match self.movement_type.sign_rule() {
            SignRule::Positive => self.quantity > 0,
            SignRule::Negative => self.quantity < 0,
            SignRule::Either => true,
        };
        if !sign_ok {
            return Err(InventoryError::invalid_movement(format!(
                "{} movement cannot carry quantity {}",
                self.movement_type, self.quantity
            )));
        }
        if self.compensates.is_some() && self.movement_type != MovementType::Adjustment {
            return Err(InventoryError::invalid_movement(
                "only ADJUSTMENT entries can compensate another entry",
            ));
        }
        if matches!(self.unit_cost, Some(c) if c < 0) {
            return Err(InventoryError::invalid_movement("unit_cost cannot be negative"));
        }
        Ok(())
    }

    /// `unit_cost × |quantity|`, absent when no unit cost was given.
    pub fn total_cost(&self) -> InventoryResult<Option<i64>> {
        self.unit_cost
            .map(|cost| {
                cost.checked_mul(self.quantity.abs())
                    .ok_or_else(|| InventoryError::invalid_movement("total_cost overflows"))
            })
            .transpose()
    }
}

/// An appended, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub id: MovementId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub unit_cost: Option<i64>,
    pub total_cost: Option<i64>,
    pub user_id: UserId,
    pub reference_id: Option<ReferenceId>,
    pub compensates: Option<MovementId>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MovementEntry {
    /// Validate `movement` and stamp it with its identity.
    pub fn record(movement: NewMovement, id: MovementId, created_at: DateTime<Utc>) -> InventoryResult<Self> {
        movement.validate()?;
        let total_cost = movement.total_cost()?;
        Ok(Self {
            id,
            product_id: movement.product_id,
            location_id: movement.location_id,
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            unit_cost: movement.unit_cost,
            total_cost,
            user_id: movement.user_id,
            reference_id: movement.reference_id,
            compensates: movement.compensates,
            reason: movement.reason,
            notes: movement.notes,
            created_at,
        })
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    /// The ADJUSTMENT that undoes this entry, linked back through `compensates`.
    ///
    /// Transfer legs are refused: undoing one leg alone would leave the paired
    /// location untouched; move the stock back with another transfer instead.
    pub fn compensation(&self, user_id: UserId, notes: Option<&str>) -> InventoryResult<NewMovement> {
        if self.movement_type == MovementType::Transfer {
            return Err(InventoryError::invalid_movement(format!(
                "cannot compensate transfer leg {}; transfer the stock back instead",
                self.id
            )));
        }
        let notes = match notes {
            Some(n) if !n.trim().is_empty() => format!("compensates {}: {}", self.id, n.trim()),
            _ => format!("compensates {}", self.id),
        };
        Ok(NewMovement {
            compensates: Some(self.id),
            ..NewMovement::new(self.key(), MovementType::Adjustment, -self.quantity, user_id)
                .with_unit_cost(self.unit_cost)
                .with_reference(self.reference_id)
                .with_reason(Some("CORRECTION".to_string()))
                .with_notes(Some(notes))
        })
    }
}

/// Direction filter for ledger queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantitySign {
    Increase,
    Decrease,
}

/// Ledger query criteria; every field is optional and they combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
    pub user_id: Option<UserId>,
    pub movement_type: Option<MovementType>,
    pub reference_id: Option<ReferenceId>,
    /// Entries compensating this movement.
    pub compensates: Option<MovementId>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    pub sign: Option<QuantitySign>,
}

impl MovementFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn for_key(key: StockKey) -> Self {
        Self {
            product_id: Some(key.product_id),
            location_id: Some(key.location_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &MovementEntry) -> bool {
        self.product_id.is_none_or(|p| p == entry.product_id)
            && self.location_id.is_none_or(|l| l == entry.location_id)
            && self.user_id.is_none_or(|u| u == entry.user_id)
            && self.movement_type.is_none_or(|t| t == entry.movement_type)
            && self.reference_id.is_none_or(|r| Some(r) == entry.reference_id)
            && self.compensates.is_none_or(|c| Some(c) == entry.compensates)
            && self.from.is_none_or(|from| entry.created_at >= from)
            && self.to.is_none_or(|to| entry.created_at <= to)
            && self.sign.is_none_or(|sign| match sign {
                QuantitySign::Increase => entry.quantity > 0,
                QuantitySign::Decrease => entry.quantity < 0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), LocationId::new())
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("damage".parse::<MovementType>().unwrap(), MovementType::Damage);
        assert_eq!("TRANSFER".parse::<MovementType>().unwrap(), MovementType::Transfer);
        assert!(matches!(
            "SHRINK".parse::<MovementType>(),
            Err(InventoryError::InvalidMovement(_))
        ));
    }

    #[test]
    fn rejects_zero_quantity() {
        let m = NewMovement::new(key(), MovementType::Adjustment, 0, UserId::new());
        assert!(matches!(m.validate(), Err(InventoryError::InvalidQuantity(_))));
    }

    #[test]
    fn rejects_sign_inconsistent_with_type() {
        let m = NewMovement::new(key(), MovementType::Sale, 3, UserId::new());
        assert!(matches!(m.validate(), Err(InventoryError::InvalidMovement(_))));

        let m = NewMovement::new(key(), MovementType::In, -3, UserId::new());
        assert!(matches!(m.validate(), Err(InventoryError::InvalidMovement(_))));
    }

    #[test]
    fn derives_total_cost_from_absolute_quantity() {
        let m = NewMovement::new(key(), MovementType::Sale, -4, UserId::new()).with_unit_cost(Some(250));
        let entry = MovementEntry::record(m, MovementId::new(), Utc::now()).unwrap();
        assert_eq!(entry.total_cost, Some(1000));
    }

    #[test]
    fn compensation_reverses_sign_and_references_original() {
        let m = NewMovement::new(key(), MovementType::Damage, -2, UserId::new());
        let original = MovementEntry::record(m, MovementId::new(), Utc::now()).unwrap();

        let fix = original.compensation(UserId::new(), Some("miscounted")).unwrap();
        assert_eq!(fix.movement_type, MovementType::Adjustment);
        assert_eq!(fix.quantity, 2);
        assert_eq!(fix.reason.as_deref(), Some("CORRECTION"));
        assert_eq!(fix.compensates, Some(original.id));
        assert_eq!(
            fix.notes.unwrap(),
            format!("compensates {}: miscounted", original.id)
        );
    }

    #[test]
    fn only_adjustments_may_compensate() {
        let original = MovementEntry::record(
            NewMovement::new(key(), MovementType::In, 3, UserId::new()),
            MovementId::new(),
            Utc::now(),
        )
        .unwrap();
        let mut fix = original.compensation(UserId::new(), None).unwrap();
        fix.movement_type = MovementType::Out;
        assert!(matches!(fix.validate(), Err(InventoryError::InvalidMovement(_))));

        let entry = MovementEntry::record(
            original.compensation(UserId::new(), None).unwrap(),
            MovementId::new(),
            Utc::now(),
        )
        .unwrap();
        assert!(
            MovementFilter {
                compensates: Some(original.id),
                ..MovementFilter::default()
            }
            .matches(&entry)
        );
        assert!(!MovementFilter {
            compensates: Some(original.id),
            ..MovementFilter::default()
        }
        .matches(&original));
    }

    #[test]
    fn transfer_legs_cannot_be_compensated() {
        let m = NewMovement::new(key(), MovementType::Transfer, -2, UserId::new());
        let leg = MovementEntry::record(m, MovementId::new(), Utc::now()).unwrap();
        assert!(matches!(
            leg.compensation(UserId::new(), None),
            Err(InventoryError::InvalidMovement(_))
        ));
    }

    #[test]
    fn filter_combines_criteria() {
        let k = key();
        let user = UserId::new();
        let m = NewMovement::new(k, MovementType::In, 5, user);
        let entry = MovementEntry::record(m, MovementId::new(), Utc::now()).unwrap();

        assert!(MovementFilter::for_key(k).matches(&entry));
        assert!(
            MovementFilter {
                user_id: Some(user),
                sign: Some(QuantitySign::Increase),
                ..MovementFilter::default()
            }
            .matches(&entry)
        );
        assert!(
            !MovementFilter {
                sign: Some(QuantitySign::Decrease),
                ..MovementFilter::for_key(k)
            }
            .matches(&entry)
        );
        assert!(!MovementFilter::for_product(ProductId::new()).matches(&entry));
    }

    #[test]
    fn serializes_type_as_upper_case() {
        let json = serde_json::to_string(&MovementType::Adjustment).unwrap();
        assert_eq!(json, "\"ADJUSTMENT\"");
    }
}

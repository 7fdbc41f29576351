use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{InventoryError, InventoryResult, LocationId, ProductId};

/// Register key: one product at one location.
///
/// `Ord` is the global lock-acquisition order (product, then location). Every
/// unit of work that locks more than one key must lock them in this order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location_id)
    }
}

/// Sort and de-duplicate keys into lock-acquisition order.
pub fn lock_order(keys: impl IntoIterator<Item = StockKey>) -> Vec<StockKey> {
    let mut keys: Vec<StockKey> = keys.into_iter().collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Reorder threshold and capacity for one register entry.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub reorder_level: i64,
    /// 0 means unbounded.
    pub max_level: i64,
}

impl StockLevels {
    pub fn new(reorder_level: i64, max_level: i64) -> InventoryResult<Self> {
        if reorder_level < 0 {
            return Err(InventoryError::invalid_levels("reorder_level cannot be negative"));
        }
        if max_level < 0 {
            return Err(InventoryError::invalid_levels("max_level cannot be negative"));
        }
        if max_level != 0 && max_level < reorder_level {
            return Err(InventoryError::invalid_levels(format!(
                "max_level {max_level} is below reorder_level {reorder_level}"
            )));
        }
        Ok(Self {
            reorder_level,
            max_level,
        })
    }
}

/// Current on-hand state for one (product, location) pair.
///
/// `quantity` is a cached projection of the ledger: the sum of every signed
/// movement recorded for this key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub reorder_level: i64,
    pub max_level: i64,
    pub last_updated: DateTime<Utc>,
}

impl InventoryRecord {
    /// The implicit record of a key that has never been stocked.
    pub fn empty(key: StockKey, at: DateTime<Utc>) -> Self {
        Self {
            product_id: key.product_id,
            location_id: key.location_id,
            quantity: 0,
            reserved_quantity: 0,
            reorder_level: 0,
            max_level: 0,
            last_updated: at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    /// Units that can be sold or moved right now.
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }

    pub fn levels(&self) -> StockLevels {
        StockLevels {
            reorder_level: self.reorder_level,
            max_level: self.max_level,
        }
    }

    /// `0 < quantity <= reorder_level`: still stocked, but time to reorder.
    pub fn is_low_stock(&self) -> bool {
        self.quantity > 0 && self.quantity <= self.reorder_level
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity == 0
    }

    /// Whether a change landing on this state should raise a low-stock notification.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_level > 0 && self.quantity <= self.reorder_level
    }

    pub fn is_over_max(&self) -> bool {
        self.max_level > 0 && self.quantity > self.max_level
    }

    pub fn check_invariants(&self) -> InventoryResult<()> {
        if self.quantity < 0 {
            return Err(InventoryError::NegativeQuantity {
                quantity: self.quantity,
            });
        }
        if self.reserved_quantity < 0 {
            return Err(InventoryError::invalid_quantity("reserved quantity cannot be negative"));
        }
        if self.reserved_quantity > self.quantity {
            return Err(InventoryError::ReservedExceedsQuantity {
                quantity: self.quantity,
                reserved: self.reserved_quantity,
            });
        }
        Ok(())
    }

    /// Copy with a new on-hand quantity, refusing any state that breaks the invariants.
    pub fn with_quantity(&self, quantity: i64, at: DateTime<Utc>) -> InventoryResult<Self> {
        let next = Self {
            quantity,
            last_updated: at,
            ..self.clone()
        };
        next.check_invariants()?;
        Ok(next)
    }

    pub fn with_reserved(&self, reserved_quantity: i64, at: DateTime<Utc>) -> InventoryResult<Self> {
        let next = Self {
            reserved_quantity,
            last_updated: at,
            ..self.clone()
        };
        next.check_invariants()?;
        Ok(next)
    }

    pub fn with_levels(&self, levels: StockLevels, at: DateTime<Utc>) -> Self {
        Self {
            reorder_level: levels.reorder_level,
            max_level: levels.max_level,
            last_updated: at,
            ..self.clone()
        }
    }
}

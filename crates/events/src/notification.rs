use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{LocationId, ProductId};

/// Stock at a location fell to or below its reorder level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub available: i64,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryNotification {
    LowStock(LowStockAlert),
}

impl InventoryNotification {
    /// Stable routing name, e.g. for a mailer or reorder worker.
    pub fn kind(&self) -> &'static str {
        match self {
            InventoryNotification::LowStock(_) => "inventory.stock.low",
        }
    }
}

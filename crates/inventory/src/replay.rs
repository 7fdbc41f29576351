//! Rebuilding register quantities from the ledger.
//!
//! The ledger is the source of truth; these functions recompute what the
//! register should hold and report where it does not.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockroom_core::{InventoryError, InventoryResult};

use crate::movement::MovementEntry;
use crate::record::{InventoryRecord, StockKey};

/// Replay one key's history (oldest first) from an empty record.
///
/// Fails if the running total ever goes negative, which would mean the
/// history was not written by the engines.
pub fn replay_quantity<'a>(entries: impl IntoIterator<Item = &'a MovementEntry>) -> InventoryResult<i64> {
    let mut quantity: i64 = 0;
    for entry in entries {
        quantity = quantity
            .checked_add(entry.quantity)
            .ok_or_else(|| InventoryError::invalid_movement("ledger sum overflows"))?;
        if quantity < 0 {
            return Err(InventoryError::NegativeQuantity { quantity });
        }
    }
    Ok(quantity)
}

/// Net signed quantity per key across `entries` (any order).
pub fn ledger_balances<'a>(entries: impl IntoIterator<Item = &'a MovementEntry>) -> BTreeMap<StockKey, i64> {
    let mut balances = BTreeMap::new();
    for entry in entries {
        *balances.entry(entry.key()).or_insert(0) += entry.quantity;
    }
    balances
}

/// A key whose cached register quantity disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub key: StockKey,
    pub register_quantity: i64,
    pub ledger_quantity: i64,
}

/// Compare register records against ledger balances.
///
/// Keys present on only one side count as 0 on the other.
pub fn reconcile<'a>(
    records: impl IntoIterator<Item = &'a InventoryRecord>,
    entries: impl IntoIterator<Item = &'a MovementEntry>,
) -> Vec<Discrepancy> {
    let mut ledger = ledger_balances(entries);
    let mut out = Vec::new();

    for record in records {
        let ledger_quantity = ledger.remove(&record.key()).unwrap_or(0);
        if ledger_quantity != record.quantity {
            out.push(Discrepancy {
                key: record.key(),
                register_quantity: record.quantity,
                ledger_quantity,
            });
        }
    }

    out.extend(
        ledger
            .into_iter()
            .filter(|(_, q)| *q != 0)
            .map(|(key, ledger_quantity)| Discrepancy {
                key,
                register_quantity: 0,
                ledger_quantity,
            }),
    );

    out.sort_by_key(|d| d.key);
    out
}

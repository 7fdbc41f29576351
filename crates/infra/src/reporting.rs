//! Read-only reports over committed state.
//!
//! Nothing here locks: readers may see state a moment old, but never a
//! half-applied unit of work.

use serde::{Deserialize, Serialize};

use stockroom_core::{InventoryResult, LocationId, ProductId};
use stockroom_inventory::{reconcile, Discrepancy, InventoryRecord, MovementFilter};

use crate::ledger::MovementLedger;
use crate::store::{InventoryStore, MovementPage, Pagination};

/// Stock held at one location, across products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub location_id: LocationId,
    pub product_count: u64,
    pub total_quantity: i64,
    pub total_reserved: i64,
    pub total_available: i64,
    pub low_stock_count: u64,
    pub zero_stock_count: u64,
}

impl LocationSummary {
    pub fn from_records<'a>(location_id: LocationId, records: impl IntoIterator<Item = &'a InventoryRecord>) -> Self {
        let mut summary = Self {
            location_id,
            product_count: 0,
            total_quantity: 0,
            total_reserved: 0,
            total_available: 0,
            low_stock_count: 0,
            zero_stock_count: 0,
        };
        for record in records {
            summary.product_count += 1;
            summary.total_quantity += record.quantity;
            summary.total_reserved += record.reserved_quantity;
            summary.total_available += record.available();
            summary.low_stock_count += u64::from(record.is_low_stock());
            summary.zero_stock_count += u64::from(record.is_out_of_stock());
        }
        summary
    }
}

#[derive(Debug, Clone)]
pub struct Reporting<S> {
    store: S,
    ledger: MovementLedger<S>,
}

impl<S> Reporting<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, max_page_size: u32) -> Self {
        Self {
            ledger: MovementLedger::new(store.clone(), max_page_size),
            store,
        }
    }

    /// On-hand quantity of a product summed over every location.
    pub async fn total_stock(&self, product_id: ProductId) -> InventoryResult<i64> {
        let records = self.store.records_for_product(product_id).await?;
        Ok(records.iter().map(|r| r.quantity).sum())
    }

    /// Records with `0 < quantity <= reorder_level`.
    pub async fn low_stock(&self) -> InventoryResult<Vec<InventoryRecord>> {
        Ok(self.store.low_stock().await?)
    }

    pub async fn zero_stock(&self) -> InventoryResult<Vec<InventoryRecord>> {
        Ok(self.store.zero_stock().await?)
    }

    pub async fn location_summary(&self, location_id: LocationId) -> InventoryResult<LocationSummary> {
        let records = self.store.records_for_location(location_id).await?;
        Ok(LocationSummary::from_records(location_id, &records))
    }

    /// One summary per location holding any record, by location id.
    pub async fn location_summaries(&self) -> InventoryResult<Vec<LocationSummary>> {
        let mut out = Vec::new();
        for location_id in self.store.stocked_locations().await? {
            out.push(self.location_summary(location_id).await?);
        }
        Ok(out)
    }

    pub async fn movement_history(&self, filter: &MovementFilter, page: Pagination) -> InventoryResult<MovementPage> {
        self.ledger.list(filter, page).await
    }

    /// Keys of `product_id` whose register quantity disagrees with the ledger.
    ///
    /// Register and ledger are read separately; a commit landing between the
    /// two reads can show up as a transient discrepancy.
    pub async fn reconcile(&self, product_id: ProductId) -> InventoryResult<Vec<Discrepancy>> {
        let records = self.store.records_for_product(product_id).await?;
        let history = self.ledger.history(product_id).await?;
        Ok(reconcile(&records, &history))
    }
}

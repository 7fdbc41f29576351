use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use stockroom_core::{InventoryError, LocationId, MovementId, ProductId};
use stockroom_inventory::{InventoryRecord, MovementEntry, MovementFilter, StockKey};

use super::query::{MovementPage, Pagination};

/// Store operation error.
///
/// These are **infrastructure errors** (locking, connectivity, decoding) as
/// opposed to inventory rule violations, which never reach the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A per-key lock could not be acquired before the deadline.
    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),

    /// A unit of work touched a key it does not hold a lock on.
    #[error("key {0} is not locked by this unit of work")]
    NotLocked(StockKey),

    /// Failure the backend reports as transient (serialization, pool exhaustion, IO).
    #[error("transient store failure: {0}")]
    Transient(String),

    /// A persisted row could not be mapped back into a domain value.
    #[error("failed to decode stored row: {0}")]
    Decode(String),

    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_) | StoreError::Transient(_))
    }
}

impl From<StoreError> for InventoryError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::LockTimeout(msg) => InventoryError::lock_timeout(msg),
            other => {
                let retryable = other.is_retryable();
                InventoryError::store(other.to_string(), retryable)
            }
        }
    }
}

/// One atomic, key-locked unit of work against the register and ledger.
///
/// Obtained from [`InventoryStore::begin`], which acquires exclusive locks on
/// every key up front. Writes are staged and become visible to readers only on
/// [`commit`](UnitOfWork::commit), all at once.
///
/// Dropping an uncommitted unit of work rolls it back and releases its locks;
/// this is how a cancelled caller (a dropped future) leaves no trace.
#[async_trait::async_trait]
pub trait UnitOfWork: Send {
    /// Keys held by this unit of work, in lock order.
    fn locked_keys(&self) -> &[StockKey];

    /// Current record for a locked key, including writes staged by this unit.
    async fn load(&mut self, key: StockKey) -> Result<Option<InventoryRecord>, StoreError>;

    /// Stage the full record for a locked key.
    async fn save(&mut self, record: InventoryRecord) -> Result<(), StoreError>;

    /// Stage a ledger entry for a locked key.
    async fn append(&mut self, entry: MovementEntry) -> Result<(), StoreError>;

    /// Publish all staged writes atomically and release the locks.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all staged writes and release the locks.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transactional store for the quantity register and the movement ledger.
///
/// ## Write path
///
/// The only way to write is through a [`UnitOfWork`]. `begin` sorts the keys
/// into the global lock order (see [`stockroom_inventory::lock_order`]) before
/// acquiring them, so two units of work touching the same keys can never wait
/// on each other in a cycle. Acquisition that outlasts `lock_timeout` fails
/// with [`StoreError::LockTimeout`] and holds nothing.
///
/// ## Read path
///
/// Reads take no locks and see committed state only (read-committed): never a
/// staged write of an in-flight unit of work.
#[async_trait::async_trait]
pub trait InventoryStore: Send + Sync {
    async fn begin(
        &self,
        keys: &[StockKey],
        lock_timeout: Duration,
    ) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn record(&self, key: StockKey) -> Result<Option<InventoryRecord>, StoreError>;

    /// All records of a product, ordered by location id.
    async fn records_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryRecord>, StoreError>;

    /// All records at a location, ordered by product id.
    async fn records_for_location(&self, location_id: LocationId) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Locations holding at least one record, ascending.
    async fn stocked_locations(&self) -> Result<Vec<LocationId>, StoreError>;

    /// Records with `0 < quantity <= reorder_level`.
    async fn low_stock(&self) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Records with `quantity = 0`.
    async fn zero_stock(&self) -> Result<Vec<InventoryRecord>, StoreError>;

    async fn movement(&self, id: MovementId) -> Result<Option<MovementEntry>, StoreError>;

    /// Filtered ledger page, newest first.
    async fn movements(&self, filter: &MovementFilter, page: Pagination) -> Result<MovementPage, StoreError>;

    /// Full ledger of a product, oldest first.
    async fn product_history(&self, product_id: ProductId) -> Result<Vec<MovementEntry>, StoreError>;
}

#[async_trait::async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn begin(
        &self,
        keys: &[StockKey],
        lock_timeout: Duration,
    ) -> Result<Box<dyn UnitOfWork>, StoreError> {
        (**self).begin(keys, lock_timeout).await
    }

    async fn record(&self, key: StockKey) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).record(key).await
    }

    async fn records_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).records_for_product(product_id).await
    }

    async fn records_for_location(&self, location_id: LocationId) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).records_for_location(location_id).await
    }

    async fn stocked_locations(&self) -> Result<Vec<LocationId>, StoreError> {
        (**self).stocked_locations().await
    }

    async fn low_stock(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).low_stock().await
    }

    async fn zero_stock(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).zero_stock().await
    }

    async fn movement(&self, id: MovementId) -> Result<Option<MovementEntry>, StoreError> {
        (**self).movement(id).await
    }

    async fn movements(&self, filter: &MovementFilter, page: Pagination) -> Result<MovementPage, StoreError> {
        (**self).movements(filter, page).await
    }

    async fn product_history(&self, product_id: ProductId) -> Result<Vec<MovementEntry>, StoreError> {
        (**self).product_history(product_id).await
    }
}

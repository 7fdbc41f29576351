use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex as KeyLock, OwnedMutexGuard};

use stockroom_core::{LocationId, MovementId, ProductId};
use stockroom_inventory::{lock_order, InventoryRecord, MovementEntry, MovementFilter, StockKey};

use super::query::{MovementPage, Pagination};
use super::r#trait::{InventoryStore, StoreError, UnitOfWork};

/// Committed state plus the lookup indexes a SQL store would keep.
#[derive(Debug, Default)]
struct Committed {
    records: HashMap<StockKey, InventoryRecord>,
    locations_by_product: HashMap<ProductId, BTreeSet<LocationId>>,
    products_by_location: HashMap<LocationId, BTreeSet<ProductId>>,

    /// Append order; commit order per key.
    movements: Vec<MovementEntry>,
    movement_by_id: HashMap<MovementId, usize>,
    movements_by_product: HashMap<ProductId, Vec<usize>>,
}

impl Committed {
    fn put_record(&mut self, record: InventoryRecord) {
        self.locations_by_product
            .entry(record.product_id)
            .or_default()
            .insert(record.location_id);
        self.products_by_location
            .entry(record.location_id)
            .or_default()
            .insert(record.product_id);
        self.records.insert(record.key(), record);
    }

    fn push_movement(&mut self, entry: MovementEntry) {
        let idx = self.movements.len();
        self.movement_by_id.insert(entry.id, idx);
        self.movements_by_product.entry(entry.product_id).or_default().push(idx);
        self.movements.push(entry);
    }

    fn records_where(&self, pred: impl Fn(&InventoryRecord) -> bool) -> Vec<InventoryRecord> {
        let mut out: Vec<InventoryRecord> = self.records.values().filter(|r| pred(r)).cloned().collect();
        out.sort_by_key(|r| r.key());
        out
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

type KeyLocks = Mutex<HashMap<StockKey, Arc<KeyLock<()>>>>;

/// Forget the lock of every key in `keys` that nobody holds or awaits.
///
/// Handles are only cloned out of the map under its mutex, so a strong count
/// of one here means the map holds the last reference.
fn prune_idle(locks: &KeyLocks, keys: &[StockKey]) {
    if let Ok(mut locks) = locks.lock() {
        for key in keys {
            if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(key);
            }
        }
    }
}

/// In-memory register + ledger.
///
/// Intended for tests/dev and single-process tools. Each key has its own async
/// mutex, created on demand and pruned when the last unit of work using it
/// ends; committed state sits behind one `RwLock` that is write-locked
/// only for the instant a unit of work publishes its staged writes.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    committed: Arc<RwLock<Committed>>,
    key_locks: Arc<KeyLocks>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_lock(&self, key: StockKey) -> Result<Arc<KeyLock<()>>, StoreError> {
        let mut locks = self.key_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(key).or_default().clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Committed>, StoreError> {
        self.committed.read().map_err(|_| poisoned())
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.key_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn begin(
        &self,
        keys: &[StockKey],
        lock_timeout: Duration,
    ) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let keys = lock_order(keys.iter().copied());
        let deadline = tokio::time::Instant::now() + lock_timeout;

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = self.key_lock(*key)?;
            match tokio::time::timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    drop(guards);
                    prune_idle(&self.key_locks, &keys);
                    return Err(StoreError::LockTimeout(format!("{key} after {lock_timeout:?}")));
                }
            }
        }

        Ok(Box::new(InMemoryUnitOfWork {
            committed: Arc::clone(&self.committed),
            key_locks: Arc::clone(&self.key_locks),
            keys,
            guards,
            staged_records: HashMap::new(),
            staged_movements: Vec::new(),
        }))
    }

    async fn record(&self, key: StockKey) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self.read()?.records.get(&key).cloned())
    }

    async fn records_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryRecord>, StoreError> {
        let state = self.read()?;
        let Some(locations) = state.locations_by_product.get(&product_id) else {
            return Ok(vec![]);
        };
        Ok(locations
            .iter()
            .filter_map(|l| state.records.get(&StockKey::new(product_id, *l)).cloned())
            .collect())
    }

    async fn records_for_location(&self, location_id: LocationId) -> Result<Vec<InventoryRecord>, StoreError> {
        let state = self.read()?;
        let Some(products) = state.products_by_location.get(&location_id) else {
            return Ok(vec![]);
        };
        Ok(products
            .iter()
            .filter_map(|p| state.records.get(&StockKey::new(*p, location_id)).cloned())
            .collect())
    }

    async fn stocked_locations(&self) -> Result<Vec<LocationId>, StoreError> {
        let state = self.read()?;
        let mut locations: Vec<LocationId> = state.products_by_location.keys().copied().collect();
        locations.sort();
        Ok(locations)
    }

    async fn low_stock(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        Ok(self.read()?.records_where(InventoryRecord::is_low_stock))
    }

    async fn zero_stock(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        Ok(self.read()?.records_where(InventoryRecord::is_out_of_stock))
    }

    async fn movement(&self, id: MovementId) -> Result<Option<MovementEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .movement_by_id
            .get(&id)
            .and_then(|idx| state.movements.get(*idx))
            .cloned())
    }

    async fn movements(&self, filter: &MovementFilter, page: Pagination) -> Result<MovementPage, StoreError> {
        let state = self.read()?;

        let candidates: Box<dyn Iterator<Item = &MovementEntry>> = match filter.product_id {
            Some(product_id) => Box::new(
                state
                    .movements_by_product
                    .get(&product_id)
                    .into_iter()
                    .flatten()
                    .rev()
                    .filter_map(|idx| state.movements.get(*idx)),
            ),
            None => Box::new(state.movements.iter().rev()),
        };

        // Newest appended first; the stable sort keeps that order for equal timestamps.
        let mut matched: Vec<&MovementEntry> = candidates.filter(|e| filter.matches(e)).collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as u64;
        let entries = matched
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok(MovementPage::from_matches(total, entries, page))
    }

    async fn product_history(&self, product_id: ProductId) -> Result<Vec<MovementEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .movements_by_product
            .get(&product_id)
            .into_iter()
            .flatten()
            .filter_map(|idx| state.movements.get(*idx))
            .cloned()
            .collect())
    }
}

/// Staged writes over the committed state, holding the key locks.
struct InMemoryUnitOfWork {
    committed: Arc<RwLock<Committed>>,
    key_locks: Arc<KeyLocks>,
    keys: Vec<StockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    staged_records: HashMap<StockKey, InventoryRecord>,
    staged_movements: Vec<MovementEntry>,
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        self.guards.clear();
        prune_idle(&self.key_locks, &self.keys);
    }
}

impl InMemoryUnitOfWork {
    fn ensure_locked(&self, key: StockKey) -> Result<(), StoreError> {
        if self.keys.binary_search(&key).is_ok() {
            Ok(())
        } else {
            Err(StoreError::NotLocked(key))
        }
    }
}

#[async_trait::async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn locked_keys(&self) -> &[StockKey] {
        &self.keys
    }

    async fn load(&mut self, key: StockKey) -> Result<Option<InventoryRecord>, StoreError> {
        self.ensure_locked(key)?;
        if let Some(staged) = self.staged_records.get(&key) {
            return Ok(Some(staged.clone()));
        }
        let state = self.committed.read().map_err(|_| poisoned())?;
        Ok(state.records.get(&key).cloned())
    }

    async fn save(&mut self, record: InventoryRecord) -> Result<(), StoreError> {
        self.ensure_locked(record.key())?;
        self.staged_records.insert(record.key(), record);
        Ok(())
    }

    async fn append(&mut self, entry: MovementEntry) -> Result<(), StoreError> {
        self.ensure_locked(entry.key())?;
        self.staged_movements.push(entry);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let records = std::mem::take(&mut this.staged_records);
        let movements = std::mem::take(&mut this.staged_movements);

        let mut state = this.committed.write().map_err(|_| poisoned())?;
        for record in records.into_values() {
            state.put_record(record);
        }
        for entry in movements {
            state.push_movement(entry);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::UserId;
    use stockroom_inventory::{MovementType, NewMovement};

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), LocationId::new())
    }

    fn stocked(key: StockKey, quantity: i64) -> InventoryRecord {
        InventoryRecord {
            quantity,
            ..InventoryRecord::empty(key, Utc::now())
        }
    }

    fn entry(key: StockKey, quantity: i64) -> MovementEntry {
        MovementEntry::record(
            NewMovement::new(key, MovementType::Adjustment, quantity, UserId::new()),
            MovementId::new(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = InMemoryInventoryStore::new();
        let k = key();

        let mut tx = store.begin(&[k], TIMEOUT).await.unwrap();
        tx.save(stocked(k, 5)).await.unwrap();
        tx.append(entry(k, 5)).await.unwrap();

        assert_eq!(tx.load(k).await.unwrap().unwrap().quantity, 5);
        assert!(store.record(k).await.unwrap().is_none());

        tx.commit().await.unwrap();

        assert_eq!(store.record(k).await.unwrap().unwrap().quantity, 5);
        assert_eq!(store.product_history(k.product_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes_and_releases_lock() {
        let store = InMemoryInventoryStore::new();
        let k = key();

        {
            let mut tx = store.begin(&[k], TIMEOUT).await.unwrap();
            tx.save(stocked(k, 9)).await.unwrap();
        }

        assert!(store.record(k).await.unwrap().is_none());
        assert!(store.begin(&[k], TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn second_unit_of_work_times_out_on_held_key() {
        let store = InMemoryInventoryStore::new();
        let k = key();

        let _held = store.begin(&[k], TIMEOUT).await.unwrap();
        let err = store.begin(&[k], Duration::from_millis(20)).await.err().unwrap();
        assert!(matches!(err, StoreError::LockTimeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn idle_key_locks_are_forgotten() {
        let store = InMemoryInventoryStore::new();
        let (a, b) = (key(), key());

        let tx = store.begin(&[a, b], TIMEOUT).await.unwrap();
        assert_eq!(store.tracked_locks(), 2);
        tx.commit().await.unwrap();
        assert_eq!(store.tracked_locks(), 0);

        {
            let _tx = store.begin(&[a], TIMEOUT).await.unwrap();
        }
        assert_eq!(store.tracked_locks(), 0);

        let held = store.begin(&[a], TIMEOUT).await.unwrap();
        assert!(store.begin(&[b, a], Duration::from_millis(20)).await.is_err());
        assert_eq!(store.tracked_locks(), 1);
        drop(held);
        assert_eq!(store.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn writes_to_unlocked_keys_are_refused() {
        let store = InMemoryInventoryStore::new();
        let (locked, other) = (key(), key());

        let mut tx = store.begin(&[locked], TIMEOUT).await.unwrap();
        assert!(matches!(tx.save(stocked(other, 1)).await, Err(StoreError::NotLocked(_))));
        assert!(matches!(tx.append(entry(other, 1)).await, Err(StoreError::NotLocked(_))));
    }

    #[tokio::test]
    async fn movements_are_listed_newest_first_with_paging() {
        let store = InMemoryInventoryStore::new();
        let k = key();

        let mut tx = store.begin(&[k], TIMEOUT).await.unwrap();
        for q in 1..=5 {
            tx.append(entry(k, q)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let filter = MovementFilter::for_key(k);
        let page = store.movements(&filter, Pagination { limit: 2, offset: 0 }).await.unwrap();
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        assert_eq!(page.entries.iter().map(|e| e.quantity).collect::<Vec<_>>(), vec![5, 4]);

        let last = store.movements(&filter, Pagination { limit: 2, offset: 4 }).await.unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.entries[0].quantity, 1);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn reports_use_indexes_per_product_and_location() {
        let store = InMemoryInventoryStore::new();
        let product = ProductId::new();
        let (a, b) = (StockKey::new(product, LocationId::new()), StockKey::new(product, LocationId::new()));

        let mut tx = store.begin(&[a, b], TIMEOUT).await.unwrap();
        tx.save(stocked(a, 0)).await.unwrap();
        tx.save(stocked(b, 3)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.records_for_product(product).await.unwrap().len(), 2);
        assert_eq!(store.records_for_location(a.location_id).await.unwrap().len(), 1);
        let empty = store.zero_stock().await.unwrap();
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].key(), a);
        assert_eq!(store.stocked_locations().await.unwrap().len(), 2);
    }
}

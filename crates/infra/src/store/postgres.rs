//! Postgres-backed register and ledger.
//!
//! ## Locking
//!
//! `begin` opens a transaction, sets transaction-local `lock_timeout` and
//! `statement_timeout` to the caller's budget, and then, for each key in lock
//! order, inserts a zero row if none exists (`ON CONFLICT DO NOTHING`) and
//! takes the row lock with `SELECT … FOR UPDATE`.
//! Inserting first means a key that has never been stocked is lockable too; a
//! rolled-back unit of work takes its zero row with it.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (lock_not_available) | `55P03` | `LockTimeout` |
//! | Database (query_canceled) | `57014` | `LockTimeout` |
//! | Database (deadlock_detected) | `40P01` | `LockTimeout` |
//! | Database (serialization_failure) | `40001` | `Transient` |
//! | Database (other) | any other | `Backend` |
//! | PoolTimedOut / Io | N/A | `Transient` |
//! | ColumnNotFound / ColumnDecode / Decode | N/A | `Decode` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockroom_core::{LocationId, MovementId, ProductId, ReferenceId, UserId};
use stockroom_inventory::{
    lock_order, InventoryRecord, MovementEntry, MovementFilter, MovementType, QuantitySign, StockKey,
};

use super::query::{MovementPage, Pagination};
use super::r#trait::{InventoryStore, StoreError, UnitOfWork};

/// Logical layout of the register and ledger tables.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS inventory (
    product_id        UUID        NOT NULL,
    location_id       UUID        NOT NULL,
    quantity          BIGINT      NOT NULL DEFAULT 0 CHECK (quantity >= 0),
    reserved_quantity BIGINT      NOT NULL DEFAULT 0 CHECK (reserved_quantity >= 0),
    reorder_level     BIGINT      NOT NULL DEFAULT 0 CHECK (reorder_level >= 0),
    max_level         BIGINT      NOT NULL DEFAULT 0 CHECK (max_level >= 0),
    last_updated      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (product_id, location_id),
    CHECK (reserved_quantity <= quantity)
);

CREATE INDEX IF NOT EXISTS inventory_location_idx ON inventory (location_id);

CREATE TABLE IF NOT EXISTS stock_movement (
    seq           BIGSERIAL   PRIMARY KEY,
    id            UUID        NOT NULL UNIQUE,
    product_id    UUID        NOT NULL,
    location_id   UUID        NOT NULL,
    movement_type TEXT        NOT NULL,
    quantity      BIGINT      NOT NULL CHECK (quantity <> 0),
    unit_cost     BIGINT,
    total_cost    BIGINT,
    user_id       UUID        NOT NULL,
    reference_id  UUID,
    compensates   UUID,
    reason        TEXT,
    notes         TEXT,
    created_at    TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS stock_movement_product_idx ON stock_movement (product_id, created_at);
CREATE INDEX IF NOT EXISTS stock_movement_location_idx ON stock_movement (location_id, created_at);
CREATE INDEX IF NOT EXISTS stock_movement_reference_idx ON stock_movement (reference_id);
CREATE UNIQUE INDEX IF NOT EXISTS stock_movement_compensates_idx ON stock_movement (compensates)
    WHERE compensates IS NOT NULL;
"#;

const RECORD_COLUMNS: &str =
    "product_id, location_id, quantity, reserved_quantity, reorder_level, max_level, last_updated";

const MOVEMENT_COLUMNS: &str = "id, product_id, location_id, movement_type, quantity, unit_cost, \
     total_cost, user_id, reference_id, compensates, reason, notes, created_at";

/// Postgres-backed inventory store.
///
/// `Send + Sync`; all connection management is delegated to the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables and indexes in [`SCHEMA`] if they are missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_records(&self, sql: &str, bind: Option<Uuid>) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut query = sqlx::query(sql);
        if let Some(id) = bind {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_records", e))?;
        rows.iter().map(record_from_row).collect()
    }
}

async fn lock_key(tx: &mut Transaction<'static, Postgres>, key: StockKey) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO inventory (product_id, location_id) VALUES ($1, $2) \
         ON CONFLICT (product_id, location_id) DO NOTHING",
    )
    .bind(key.product_id.as_uuid())
    .bind(key.location_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_key_insert", e))?;

    sqlx::query("SELECT 1 FROM inventory WHERE product_id = $1 AND location_id = $2 FOR UPDATE")
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_key_select", e))?;

    Ok(())
}

#[async_trait::async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn begin(
        &self,
        keys: &[StockKey],
        lock_timeout: Duration,
    ) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let keys = lock_order(keys.iter().copied());
        let described = keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        let pool = Arc::clone(&self.pool);

        let acquire = async move {
            let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

            // Transaction-local. A stalled statement is cancelled (57014) rather
            // than holding row locks indefinitely.
            let budget = format!("{}ms", lock_timeout.as_millis());
            sqlx::query("SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $1, true)")
                .bind(&budget)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_timeouts", e))?;

            for key in &keys {
                lock_key(&mut tx, *key).await?;
            }

            Ok::<_, StoreError>(PostgresUnitOfWork { tx, keys })
        };

        let uow = tokio::time::timeout(lock_timeout, acquire)
            .await
            .map_err(|_| StoreError::LockTimeout(format!("{described} after {lock_timeout:?}")))??;

        Ok(Box::new(uow))
    }

    async fn record(&self, key: StockKey) -> Result<Option<InventoryRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory WHERE product_id = $1 AND location_id = $2"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn records_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryRecord>, StoreError> {
        self.fetch_records(
            &format!("SELECT {RECORD_COLUMNS} FROM inventory WHERE product_id = $1 ORDER BY location_id"),
            Some(*product_id.as_uuid()),
        )
        .await
    }

    async fn records_for_location(&self, location_id: LocationId) -> Result<Vec<InventoryRecord>, StoreError> {
        self.fetch_records(
            &format!("SELECT {RECORD_COLUMNS} FROM inventory WHERE location_id = $1 ORDER BY product_id"),
            Some(*location_id.as_uuid()),
        )
        .await
    }

    async fn stocked_locations(&self) -> Result<Vec<LocationId>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT location_id FROM inventory ORDER BY location_id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stocked_locations", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("location_id")
                    .map(LocationId::from_uuid)
                    .map_err(|e| map_sqlx_error("stocked_locations", e))
            })
            .collect()
    }

    async fn low_stock(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        self.fetch_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM inventory \
                 WHERE quantity > 0 AND quantity <= reorder_level \
                 ORDER BY product_id, location_id"
            ),
            None,
        )
        .await
    }

    async fn zero_stock(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        self.fetch_records(
            &format!("SELECT {RECORD_COLUMNS} FROM inventory WHERE quantity = 0 ORDER BY product_id, location_id"),
            None,
        )
        .await
    }

    async fn movement(&self, id: MovementId) -> Result<Option<MovementEntry>, StoreError> {
        let row = sqlx::query(&format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movement WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("movement", e))?;

        row.as_ref().map(movement_from_row).transpose()
    }

    async fn movements(&self, filter: &MovementFilter, page: Pagination) -> Result<MovementPage, StoreError> {
        // Optional filters as NULL-able parameters keep this a single prepared statement.
        const WHERE: &str = "WHERE ($1::uuid IS NULL OR product_id = $1) \
               AND ($2::uuid IS NULL OR location_id = $2) \
               AND ($3::uuid IS NULL OR user_id = $3) \
               AND ($4::text IS NULL OR movement_type = $4) \
               AND ($5::uuid IS NULL OR reference_id = $5) \
               AND ($6::uuid IS NULL OR compensates = $6) \
               AND ($7::timestamptz IS NULL OR created_at >= $7) \
               AND ($8::timestamptz IS NULL OR created_at <= $8) \
               AND ($9::text IS NULL \
                    OR ($9 = 'increase' AND quantity > 0) \
                    OR ($9 = 'decrease' AND quantity < 0))";

        let product = filter.product_id.map(Uuid::from);
        let location = filter.location_id.map(Uuid::from);
        let user = filter.user_id.map(Uuid::from);
        let movement_type = filter.movement_type.map(MovementType::as_str);
        let reference = filter.reference_id.map(Uuid::from);
        let compensates = filter.compensates.map(Uuid::from);
        let sign = filter.sign.map(|s| match s {
            QuantitySign::Increase => "increase",
            QuantitySign::Decrease => "decrease",
        });

        let count_sql = format!("SELECT COUNT(*) AS total FROM stock_movement {WHERE}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(product)
            .bind(location)
            .bind(user)
            .bind(movement_type)
            .bind(reference)
            .bind(compensates)
            .bind(filter.from)
            .bind(filter.to)
            .bind(sign)
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let page_sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movement {WHERE} \
             ORDER BY created_at DESC, seq DESC LIMIT $10 OFFSET $11"
        );
        let rows = sqlx::query(&page_sql)
            .bind(product)
            .bind(location)
            .bind(user)
            .bind(movement_type)
            .bind(reference)
            .bind(compensates)
            .bind(filter.from)
            .bind(filter.to)
            .bind(sign)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;

        let entries = rows.iter().map(movement_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(MovementPage::from_matches(total.max(0) as u64, entries, page))
    }

    async fn product_history(&self, product_id: ProductId) -> Result<Vec<MovementEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movement WHERE product_id = $1 ORDER BY seq ASC"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product_history", e))?;

        rows.iter().map(movement_from_row).collect()
    }
}

/// An open transaction holding `FOR UPDATE` locks on its keys.
///
/// Dropping it without commit rolls the transaction back (SQLx semantics).
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
    keys: Vec<StockKey>,
}

impl PostgresUnitOfWork {
    fn ensure_locked(&self, key: StockKey) -> Result<(), StoreError> {
        if self.keys.binary_search(&key).is_ok() {
            Ok(())
        } else {
            Err(StoreError::NotLocked(key))
        }
    }
}

#[async_trait::async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn locked_keys(&self) -> &[StockKey] {
        &self.keys
    }

    async fn load(&mut self, key: StockKey) -> Result<Option<InventoryRecord>, StoreError> {
        self.ensure_locked(key)?;
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory WHERE product_id = $1 AND location_id = $2"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn save(&mut self, record: InventoryRecord) -> Result<(), StoreError> {
        self.ensure_locked(record.key())?;
        sqlx::query(
            "UPDATE inventory SET quantity = $3, reserved_quantity = $4, reorder_level = $5, \
             max_level = $6, last_updated = $7 WHERE product_id = $1 AND location_id = $2",
        )
        .bind(record.product_id.as_uuid())
        .bind(record.location_id.as_uuid())
        .bind(record.quantity)
        .bind(record.reserved_quantity)
        .bind(record.reorder_level)
        .bind(record.max_level)
        .bind(record.last_updated)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save", e))?;
        Ok(())
    }

    async fn append(&mut self, entry: MovementEntry) -> Result<(), StoreError> {
        self.ensure_locked(entry.key())?;
        sqlx::query(&format!(
            "INSERT INTO stock_movement ({MOVEMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(entry.id.as_uuid())
        .bind(entry.product_id.as_uuid())
        .bind(entry.location_id.as_uuid())
        .bind(entry.movement_type.as_str())
        .bind(entry.quantity)
        .bind(entry.unit_cost)
        .bind(entry.total_cost)
        .bind(entry.user_id.as_uuid())
        .bind(entry.reference_id.map(Uuid::from))
        .bind(entry.compensates.map(Uuid::from))
        .bind(entry.reason.as_deref())
        .bind(entry.notes.as_deref())
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn record_from_row(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    let decode = |e| map_sqlx_error("decode_record", e);
    Ok(InventoryRecord {
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        location_id: LocationId::from_uuid(row.try_get("location_id").map_err(decode)?),
        quantity: row.try_get("quantity").map_err(decode)?,
        reserved_quantity: row.try_get("reserved_quantity").map_err(decode)?,
        reorder_level: row.try_get("reorder_level").map_err(decode)?,
        max_level: row.try_get("max_level").map_err(decode)?,
        last_updated: row.try_get::<DateTime<Utc>, _>("last_updated").map_err(decode)?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<MovementEntry, StoreError> {
    let decode = |e| map_sqlx_error("decode_movement", e);
    let movement_type: String = row.try_get("movement_type").map_err(decode)?;
    let movement_type = movement_type
        .parse::<MovementType>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;

    Ok(MovementEntry {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        location_id: LocationId::from_uuid(row.try_get("location_id").map_err(decode)?),
        movement_type,
        quantity: row.try_get("quantity").map_err(decode)?,
        unit_cost: row.try_get("unit_cost").map_err(decode)?,
        total_cost: row.try_get("total_cost").map_err(decode)?,
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
        reference_id: row
            .try_get::<Option<Uuid>, _>("reference_id")
            .map_err(decode)?
            .map(ReferenceId::from_uuid),
        compensates: row
            .try_get::<Option<Uuid>, _>("compensates")
            .map_err(decode)?
            .map(MovementId::from_uuid),
        reason: row.try_get("reason").map_err(decode)?,
        notes: row.try_get("notes").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40P01") | Some("57014") => StoreError::LockTimeout(msg),
                Some("40001") => StoreError::Transient(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Transient(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Transient(format!("io error in {operation}: {e}")),
        e @ (sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)) => StoreError::Decode(format!("{operation}: {e}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

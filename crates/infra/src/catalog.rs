//! Product and location lookups.
//!
//! Products and locations are owned elsewhere; the engines only need to know
//! that an id exists and whether a location accepts stock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use stockroom_core::{InventoryError, InventoryResult, LocationId, ProductId};

use crate::store::postgres::map_sqlx_error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    /// Inactive locations keep their stock but reject new movements.
    pub active: bool,
}

#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: ProductId) -> InventoryResult<Option<Product>>;

    async fn location(&self, id: LocationId) -> InventoryResult<Option<Location>>;

    async fn require_product(&self, id: ProductId) -> InventoryResult<Product> {
        self.product(id)
            .await?
            .ok_or_else(|| InventoryError::not_found("product", id))
    }

    /// The location, which must exist and be active.
    async fn require_active_location(&self, id: LocationId) -> InventoryResult<Location> {
        let location = self
            .location(id)
            .await?
            .ok_or_else(|| InventoryError::not_found("location", id))?;
        if !location.active {
            return Err(InventoryError::LocationInactive(id));
        }
        Ok(location)
    }
}

#[async_trait::async_trait]
impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    async fn product(&self, id: ProductId) -> InventoryResult<Option<Product>> {
        (**self).product(id).await
    }

    async fn location(&self, id: LocationId) -> InventoryResult<Option<Location>> {
        (**self).location(id).await
    }
}

/// In-memory catalog for tests and single-process tools.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
    locations: RwLock<HashMap<LocationId, Location>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, sku: impl Into<String>, name: impl Into<String>) -> InventoryResult<ProductId> {
        let product = Product {
            id: ProductId::new(),
            sku: sku.into(),
            name: name.into(),
        };
        let id = product.id;
        self.products.write().map_err(|_| poisoned())?.insert(id, product);
        Ok(id)
    }

    /// Register an active location.
    pub fn add_location(&self, name: impl Into<String>) -> InventoryResult<LocationId> {
        let location = Location {
            id: LocationId::new(),
            name: name.into(),
            active: true,
        };
        let id = location.id;
        self.locations.write().map_err(|_| poisoned())?.insert(id, location);
        Ok(id)
    }

    /// Returns `Ok(false)` if the location is unknown.
    pub fn set_location_active(&self, id: LocationId, active: bool) -> InventoryResult<bool> {
        let mut locations = self.locations.write().map_err(|_| poisoned())?;
        Ok(match locations.get_mut(&id) {
            Some(location) => {
                location.active = active;
                true
            }
            None => false,
        })
    }
}

fn poisoned() -> InventoryError {
    InventoryError::store("catalog lock poisoned", false)
}

#[async_trait::async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: ProductId) -> InventoryResult<Option<Product>> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products.get(&id).cloned())
    }

    async fn location(&self, id: LocationId) -> InventoryResult<Option<Location>> {
        let locations = self.locations.read().map_err(|_| poisoned())?;
        Ok(locations.get(&id).cloned())
    }
}

/// Catalog backed by the `products` and `locations` tables.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait::async_trait]
impl Catalog for PostgresCatalog {
    async fn product(&self, id: ProductId) -> InventoryResult<Option<Product>> {
        let row = sqlx::query("SELECT id, sku, name FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("catalog_product", e))?;

        let Some(row) = row else { return Ok(None) };
        let decode = |e| InventoryError::from(map_sqlx_error("decode_product", e));
        Ok(Some(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
            sku: row.try_get("sku").map_err(decode)?,
            name: row.try_get("name").map_err(decode)?,
        }))
    }

    async fn location(&self, id: LocationId) -> InventoryResult<Option<Location>> {
        let row = sqlx::query("SELECT id, name, active FROM locations WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("catalog_location", e))?;

        let Some(row) = row else { return Ok(None) };
        let decode = |e| InventoryError::from(map_sqlx_error("decode_location", e));
        Ok(Some(Location {
            id: LocationId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
            name: row.try_get("name").map_err(decode)?,
            active: row.try_get("active").map_err(decode)?,
        }))
    }
}

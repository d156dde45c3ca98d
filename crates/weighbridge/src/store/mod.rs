//! SQLite persistence with tenant-scoped access handles.
//!
//! Nothing outside this module can issue a query that is not bound to a
//! tenant: [`Store::for_tenant`] is the only way in, and every statement
//! behind [`TenantStore`] and [`TenantTx`] carries the tenant predicate.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use uuid::Uuid;

use crate::workflows::orders::domain::TenantId;

mod catalog;
mod events;
mod orders;
mod settings;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Handle to the SQLite store. Cheap to clone; data access goes through
/// [`Store::for_tenant`].
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the database at `path`, creating file and schema when missing.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5_000))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests and the demo. A single connection keeps
    /// every query on the same in-memory database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Tenant-scoped view of the store.
    pub fn for_tenant(&self, tenant: TenantId) -> TenantStore {
        TenantStore {
            pool: self.pool.clone(),
            tenant,
        }
    }

    /// Raw pool handle so tests can rewrite rows the public surface
    /// never would, like backdating timestamps.
    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Tenants that still hold pending orders whose whole activity window
    /// predates `cutoff`. Drives the archival sweep.
    pub(crate) async fn tenants_with_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TenantId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT tenant_id FROM orders
            WHERE status = 'pending_weight' AND created_at < ? AND updated_at < ?
            ORDER BY tenant_id
            "#,
        )
        .bind(cutoff)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TenantId(row.get("tenant_id")))
            .collect())
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        create_catalog_items_table(&self.pool).await?;
        create_orders_table(&self.pool).await?;
        create_order_items_table(&self.pool).await?;
        create_order_item_modifiers_table(&self.pool).await?;
        create_order_events_table(&self.pool).await?;
        create_tenant_settings_table(&self.pool).await?;
        Ok(())
    }
}

/// Store handle bound to one tenant. Every query issued through it, or
/// through a [`TenantTx`] opened from it, is constrained to that tenant.
#[derive(Debug, Clone)]
pub struct TenantStore {
    pool: SqlitePool,
    tenant: TenantId,
}

impl TenantStore {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Begin a write transaction scoped to this tenant.
    pub(crate) async fn begin(&self) -> Result<TenantTx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(TenantTx {
            tx,
            tenant: self.tenant.clone(),
        })
    }
}

/// A write transaction bound to one tenant. Dropping it without calling
/// [`TenantTx::commit`] rolls every statement back.
pub struct TenantTx {
    tx: sqlx::Transaction<'static, sqlx::Sqlite>,
    tenant: TenantId,
}

impl TenantTx {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub(crate) async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value)
        .map_err(|err| StoreError::Corrupt(format!("invalid uuid '{value}': {err}")))
}

async fn create_catalog_items_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_items (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            unit_price_cents INTEGER NOT NULL DEFAULT 0,
            unit_weight_grams INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The matching key. Also what makes concurrent auto-creation safe:
    // the second writer hits this index and requeries.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_catalog_items_identity
        ON catalog_items(tenant_id, kind, normalized_name)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_orders_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            status TEXT NOT NULL,
            channel TEXT NOT NULL,
            check_number TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            customer_email TEXT,
            customer_phone TEXT,
            customer_address TEXT,
            subtotal_cents INTEGER NOT NULL,
            tax_cents INTEGER NOT NULL,
            total_cents INTEGER NOT NULL,
            expected_weight_grams INTEGER NOT NULL,
            actual_weight_grams INTEGER,
            delta_weight_grams INTEGER,
            raw_input TEXT NOT NULL,
            structured_snapshot TEXT NOT NULL,
            weight_verified_at TEXT,
            visual_status TEXT,
            visual_result TEXT,
            visual_verified_at TEXT,
            archived_at TEXT,
            archived_reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_orders_tenant_status
        ON orders(tenant_id, status)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_order_items_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id),
            tenant_id TEXT NOT NULL,
            catalog_product_id TEXT NOT NULL,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            total_price_cents INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_order_items_order
        ON order_items(order_id)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_order_item_modifiers_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS order_item_modifiers (
            id TEXT PRIMARY KEY,
            order_item_id TEXT NOT NULL REFERENCES order_items(id),
            tenant_id TEXT NOT NULL,
            catalog_modifier_id TEXT,
            name TEXT NOT NULL,
            total_price_cents INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_order_item_modifiers_item
        ON order_item_modifiers(order_item_id)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_order_events_table(pool: &SqlitePool) -> Result<(), StoreError> {
    // AUTOINCREMENT so ledger ids reflect commit order and are never
    // reused; readers order by id, not by timestamp.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS order_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id TEXT NOT NULL REFERENCES orders(id),
            tenant_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_order_events_order
        ON order_events(order_id)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tenant_settings_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenant_settings (
            tenant_id TEXT PRIMARY KEY,
            tolerance_grams INTEGER NOT NULL DEFAULT 100,
            match_mode TEXT NOT NULL DEFAULT 'substring',
            visual_prompt_template TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

//! Catalog rows: products and modifiers, keyed by normalized name.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_uuid, StoreError, TenantStore, TenantTx};
use crate::workflows::orders::domain::{CatalogItem, CatalogKind, TenantId};
use crate::workflows::orders::normalizer::normalize_name;

impl TenantStore {
    /// All catalog rows of one kind for this tenant.
    pub async fn catalog_items(&self, kind: CatalogKind) -> Result<Vec<CatalogItem>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        list_catalog_items(&mut conn, &self.tenant, kind).await
    }

    /// Insert or update a catalog row by identity.
    ///
    /// This is the surface operators use to correct rows that intake
    /// auto-created with a zero weight.
    pub async fn upsert_catalog_item(
        &self,
        kind: CatalogKind,
        name: &str,
        unit_price_cents: i64,
        unit_weight_grams: i64,
    ) -> Result<CatalogItem, StoreError> {
        let normalized = normalize_name(name);
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, tenant_id, kind, name, normalized_name,
                unit_price_cents, unit_weight_grams, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id, kind, normalized_name) DO UPDATE SET
                name = excluded.name,
                unit_price_cents = excluded.unit_price_cents,
                unit_weight_grams = excluded.unit_weight_grams,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&self.tenant.0)
        .bind(kind.label())
        .bind(name)
        .bind(&normalized)
        .bind(unit_price_cents)
        .bind(unit_weight_grams)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        fetch_by_identity(&mut conn, &self.tenant, kind, &normalized)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("catalog row '{normalized}' vanished")))
    }
}

impl TenantTx {
    /// All catalog rows of one kind, read inside the transaction.
    pub(crate) async fn catalog_items(
        &mut self,
        kind: CatalogKind,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        list_catalog_items(&mut self.tx, &self.tenant, kind).await
    }

    /// Insert a catalog row, tolerating a concurrent insert of the same
    /// identity; returns the canonical row either way.
    pub(crate) async fn insert_catalog_item(
        &mut self,
        kind: CatalogKind,
        name: &str,
        normalized_name: &str,
        unit_price_cents: i64,
        unit_weight_grams: i64,
    ) -> Result<CatalogItem, StoreError> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, tenant_id, kind, name, normalized_name,
                unit_price_cents, unit_weight_grams, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id, kind, normalized_name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&self.tenant.0)
        .bind(kind.label())
        .bind(name)
        .bind(normalized_name)
        .bind(unit_price_cents)
        .bind(unit_weight_grams)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        fetch_by_identity(&mut self.tx, &self.tenant, kind, normalized_name)
            .await?
            .ok_or_else(|| {
                StoreError::Corrupt(format!("catalog row '{normalized_name}' vanished"))
            })
    }
}

async fn list_catalog_items(
    conn: &mut SqliteConnection,
    tenant: &TenantId,
    kind: CatalogKind,
) -> Result<Vec<CatalogItem>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, kind, name, normalized_name, unit_price_cents, unit_weight_grams
        FROM catalog_items
        WHERE tenant_id = ? AND kind = ?
        ORDER BY normalized_name
        "#,
    )
    .bind(&tenant.0)
    .bind(kind.label())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(catalog_item_from_row).collect()
}

async fn fetch_by_identity(
    conn: &mut SqliteConnection,
    tenant: &TenantId,
    kind: CatalogKind,
    normalized_name: &str,
) -> Result<Option<CatalogItem>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT id, kind, name, normalized_name, unit_price_cents, unit_weight_grams
        FROM catalog_items
        WHERE tenant_id = ? AND kind = ? AND normalized_name = ?
        "#,
    )
    .bind(&tenant.0)
    .bind(kind.label())
    .bind(normalized_name)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(catalog_item_from_row).transpose()
}

fn catalog_item_from_row(row: &SqliteRow) -> Result<CatalogItem, StoreError> {
    let id: String = row.get("id");
    let kind: String = row.get("kind");

    Ok(CatalogItem {
        id: parse_uuid(&id)?,
        kind: CatalogKind::parse(&kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown catalog kind '{kind}'")))?,
        name: row.get("name"),
        normalized_name: row.get("normalized_name"),
        unit_price_cents: row.get("unit_price_cents"),
        unit_weight_grams: row.get("unit_weight_grams"),
    })
}

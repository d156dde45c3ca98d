//! Order aggregate persistence: the mutable row, its line items, and the
//! guarded status updates the lifecycle relies on.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{parse_uuid, StoreError, TenantStore, TenantTx};
use crate::workflows::orders::domain::{
    Channel, Customer, Order, OrderId, OrderItem, OrderItemModifier, OrderStatus, TenantId,
    VisualOutcome, VisualStatus,
};

impl TenantStore {
    /// Load the full order aggregate, or `None` when the id does not
    /// exist under this tenant.
    pub(crate) async fn load_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, &self.tenant, id).await
    }

    /// Pending orders whose creation and last update both predate `cutoff`,
    /// oldest first, capped at `limit`. Candidates for the archival sweep.
    pub(crate) async fn stale_pending_ids(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM orders
            WHERE tenant_id = ? AND status = 'pending_weight'
              AND created_at < ? AND updated_at < ?
            ORDER BY created_at
            LIMIT ?
            "#,
        )
        .bind(&self.tenant.0)
        .bind(cutoff)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                parse_uuid(&id).map(OrderId)
            })
            .collect()
    }
}

impl TenantTx {
    /// Persist a freshly assembled order aggregate: the order row plus
    /// every line item and modifier.
    pub(crate) async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, tenant_id, status, channel, check_number,
                customer_name, customer_email, customer_phone, customer_address,
                subtotal_cents, tax_cents, total_cents,
                expected_weight_grams, actual_weight_grams, delta_weight_grams,
                raw_input, structured_snapshot,
                weight_verified_at, visual_status, visual_result, visual_verified_at,
                archived_at, archived_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order.id.0.to_string())
        .bind(&self.tenant.0)
        .bind(order.status.label())
        .bind(order.channel.label())
        .bind(&order.check_number)
        .bind(&order.customer.name)
        .bind(order.customer.email.as_deref())
        .bind(order.customer.phone.as_deref())
        .bind(order.customer.address.as_deref())
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(order.expected_weight_grams)
        .bind(order.actual_weight_grams)
        .bind(order.delta_weight_grams)
        .bind(&order.raw_input)
        .bind(serde_json::to_string(&order.structured_snapshot)?)
        .bind(order.weight_verified_at)
        .bind(order.visual_status.map(VisualStatus::label))
        .bind(
            order
                .visual_result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(order.visual_verified_at)
        .bind(order.archived_at)
        .bind(order.archived_reason.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, tenant_id, catalog_product_id,
                    name, quantity, total_price_cents
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(item.id.to_string())
            .bind(order.id.0.to_string())
            .bind(&self.tenant.0)
            .bind(item.catalog_product_id.to_string())
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.total_price_cents)
            .execute(&mut *self.tx)
            .await?;

            for modifier in &item.modifiers {
                sqlx::query(
                    r#"
                    INSERT INTO order_item_modifiers (
                        id, order_item_id, tenant_id, catalog_modifier_id,
                        name, total_price_cents
                    ) VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(modifier.id.to_string())
                .bind(item.id.to_string())
                .bind(&self.tenant.0)
                .bind(modifier.catalog_modifier_id.map(|id| id.to_string()))
                .bind(&modifier.name)
                .bind(modifier.total_price_cents)
                .execute(&mut *self.tx)
                .await?;
            }
        }

        Ok(())
    }

    /// Load the full order aggregate inside this transaction, so a
    /// read-validate-update sequence sees a consistent row.
    pub(crate) async fn load_order(&mut self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        fetch_order(&mut self.tx, &self.tenant, id).await
    }

    /// Current status only, for transitions that need no other field.
    pub(crate) async fn order_status(
        &mut self,
        id: &OrderId,
    ) -> Result<Option<OrderStatus>, StoreError> {
        let row = sqlx::query(r#"SELECT status FROM orders WHERE tenant_id = ? AND id = ?"#)
            .bind(&self.tenant.0)
            .bind(id.0.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|row| {
            let status: String = row.get("status");
            OrderStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown order status '{status}'")))
        })
        .transpose()
    }

    /// Record a measured weight and move the order to `status`.
    pub(crate) async fn record_weight(
        &mut self,
        id: &OrderId,
        actual_grams: i64,
        delta_grams: i64,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, actual_weight_grams = ?, delta_weight_grams = ?,
                weight_verified_at = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(status.label())
        .bind(actual_grams)
        .bind(delta_grams)
        .bind(at)
        .bind(at)
        .bind(&self.tenant.0)
        .bind(id.0.to_string())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Drop the recorded weight and move the order to `status`. Used when
    /// a weighed order is sent back to the scale.
    pub(crate) async fn clear_weight(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, actual_weight_grams = NULL, delta_weight_grams = NULL,
                weight_verified_at = NULL, updated_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(status.label())
        .bind(at)
        .bind(&self.tenant.0)
        .bind(id.0.to_string())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    pub(crate) async fn update_status(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(status.label())
        .bind(at)
        .bind(&self.tenant.0)
        .bind(id.0.to_string())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Overwrite the visual verification fields. Later completions win;
    /// the ledger keeps every earlier result.
    pub(crate) async fn record_visual(
        &mut self,
        id: &OrderId,
        outcome: &VisualOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET visual_status = ?, visual_result = ?, visual_verified_at = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(outcome.status.label())
        .bind(serde_json::to_string(outcome)?)
        .bind(at)
        .bind(at)
        .bind(&self.tenant.0)
        .bind(id.0.to_string())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Archive the order unless it already is archived. Returns whether a
    /// row changed, which makes repeat calls a no-op.
    pub(crate) async fn archive_order(
        &mut self,
        id: &OrderId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'archived', archived_at = ?, archived_reason = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ? AND status != 'archived'
            "#,
        )
        .bind(at)
        .bind(reason)
        .bind(at)
        .bind(&self.tenant.0)
        .bind(id.0.to_string())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Archive a pending order only if it still satisfies the staleness
    /// predicate. The sweep re-checks here so a candidate selected before
    /// the transaction cannot be archived after someone touched it.
    pub(crate) async fn archive_if_stale(
        &mut self,
        id: &OrderId,
        cutoff: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'archived', archived_at = ?, archived_reason = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ? AND status = 'pending_weight'
              AND created_at < ? AND updated_at < ?
            "#,
        )
        .bind(at)
        .bind(reason)
        .bind(at)
        .bind(&self.tenant.0)
        .bind(id.0.to_string())
        .bind(cutoff)
        .bind(cutoff)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Restore an archived order to `status` and clear the archive marks.
    pub(crate) async fn unarchive_order(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, archived_at = NULL, archived_reason = NULL, updated_at = ?
            WHERE tenant_id = ? AND id = ? AND status = 'archived'
            "#,
        )
        .bind(status.label())
        .bind(at)
        .bind(&self.tenant.0)
        .bind(id.0.to_string())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

async fn fetch_order(
    conn: &mut SqliteConnection,
    tenant: &TenantId,
    id: &OrderId,
) -> Result<Option<Order>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT id, status, channel, check_number,
               customer_name, customer_email, customer_phone, customer_address,
               subtotal_cents, tax_cents, total_cents,
               expected_weight_grams, actual_weight_grams, delta_weight_grams,
               raw_input, structured_snapshot,
               weight_verified_at, visual_status, visual_result, visual_verified_at,
               archived_at, archived_reason, created_at, updated_at
        FROM orders
        WHERE tenant_id = ? AND id = ?
        "#,
    )
    .bind(&tenant.0)
    .bind(id.0.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut order = order_from_row(&row)?;
    order.items = fetch_items(conn, tenant, id).await?;
    Ok(Some(order))
}

async fn fetch_items(
    conn: &mut SqliteConnection,
    tenant: &TenantId,
    id: &OrderId,
) -> Result<Vec<OrderItem>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, catalog_product_id, name, quantity, total_price_cents
        FROM order_items
        WHERE tenant_id = ? AND order_id = ?
        ORDER BY rowid
        "#,
    )
    .bind(&tenant.0)
    .bind(id.0.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in &rows {
        let item_id: String = row.get("id");
        let product_id: String = row.get("catalog_product_id");

        items.push(OrderItem {
            id: parse_uuid(&item_id)?,
            catalog_product_id: parse_uuid(&product_id)?,
            name: row.get("name"),
            quantity: row.get("quantity"),
            total_price_cents: row.get("total_price_cents"),
            modifiers: Vec::new(),
        });
    }

    for item in &mut items {
        let rows = sqlx::query(
            r#"
            SELECT id, catalog_modifier_id, name, total_price_cents
            FROM order_item_modifiers
            WHERE tenant_id = ? AND order_item_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(&tenant.0)
        .bind(item.id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        for row in &rows {
            let modifier_id: String = row.get("id");
            let catalog_id: Option<String> = row.get("catalog_modifier_id");

            item.modifiers.push(OrderItemModifier {
                id: parse_uuid(&modifier_id)?,
                catalog_modifier_id: catalog_id.as_deref().map(parse_uuid).transpose()?,
                name: row.get("name"),
                total_price_cents: row.get("total_price_cents"),
            });
        }
    }

    Ok(items)
}

fn order_from_row(row: &SqliteRow) -> Result<Order, StoreError> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let channel: String = row.get("channel");
    let snapshot: String = row.get("structured_snapshot");
    let visual_status: Option<String> = row.get("visual_status");
    let visual_result: Option<String> = row.get("visual_result");

    Ok(Order {
        id: OrderId(parse_uuid(&id)?),
        status: OrderStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown order status '{status}'")))?,
        channel: Channel::parse(&channel)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown channel '{channel}'")))?,
        check_number: row.get("check_number"),
        customer: Customer {
            name: row.get("customer_name"),
            email: row.get("customer_email"),
            phone: row.get("customer_phone"),
            address: row.get("customer_address"),
        },
        subtotal_cents: row.get("subtotal_cents"),
        tax_cents: row.get("tax_cents"),
        total_cents: row.get("total_cents"),
        expected_weight_grams: row.get("expected_weight_grams"),
        actual_weight_grams: row.get("actual_weight_grams"),
        delta_weight_grams: row.get("delta_weight_grams"),
        raw_input: row.get("raw_input"),
        structured_snapshot: serde_json::from_str(&snapshot)?,
        weight_verified_at: row.get("weight_verified_at"),
        visual_status: visual_status
            .map(|value| {
                VisualStatus::parse(&value).ok_or_else(|| {
                    StoreError::Corrupt(format!("unknown visual status '{value}'"))
                })
            })
            .transpose()?,
        visual_result: visual_result
            .map(|value| serde_json::from_str::<VisualOutcome>(&value))
            .transpose()?,
        visual_verified_at: row.get("visual_verified_at"),
        archived_at: row.get("archived_at"),
        archived_reason: row.get("archived_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        items: Vec::new(),
    })
}

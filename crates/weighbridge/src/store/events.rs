//! The append-only order ledger. Rows are never updated or deleted;
//! readers rely on the id column for commit order.

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{parse_uuid, StoreError, TenantStore, TenantTx};
use crate::workflows::orders::domain::{OrderEvent, OrderEventData, OrderId};

impl TenantTx {
    pub(crate) async fn append_event(
        &mut self,
        order_id: &OrderId,
        data: &OrderEventData,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO order_events (order_id, tenant_id, event_type, data, actor, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order_id.0.to_string())
        .bind(&self.tenant.0)
        .bind(data.kind())
        .bind(serde_json::to_string(data)?)
        .bind(actor)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

impl TenantStore {
    /// Every ledger row for the order, oldest first.
    pub(crate) async fn order_events(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<OrderEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, data, actor, created_at
            FROM order_events
            WHERE tenant_id = ? AND order_id = ?
            ORDER BY id
            "#,
        )
        .bind(&self.tenant.0)
        .bind(order_id.0.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let order_id: String = row.get("order_id");
            let data: String = row.get("data");

            events.push(OrderEvent {
                id: row.get("id"),
                order_id: OrderId(parse_uuid(&order_id)?),
                data: serde_json::from_str(&data)?,
                actor: row.get("actor"),
                created_at: row.get("created_at"),
            });
        }

        Ok(events)
    }
}

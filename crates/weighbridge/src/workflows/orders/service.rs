use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::store::{Store, StoreError};

use super::domain::{
    to_minor_units, Order, OrderEvent, OrderEventData, OrderId, OrderItem, OrderItemModifier,
    OrderStatus, OrderView, StructuredOrder, TenantId, VisionVerdict, WeighTarget,
};
use super::estimator;
use super::resolver::{self, ResolutionError};
use super::structuring::{StructuringError, StructuringGateway};
use super::verification::{self, WeightVerdict};
use super::visual::{self, VisionError, VisionGateway};

/// Hours a pending order may sit untouched before the sweep archives it.
pub const INACTIVITY_WINDOW_HOURS: i64 = 24;

/// Orders archived per sweep transaction.
const SWEEP_CHUNK_SIZE: i64 = 50;

const SWEEP_REASON: &str = "auto-archived after 24h of inactivity";

/// A lifecycle command hit an order whose current status does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {operation} an order in status '{from}'")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub operation: &'static str,
}

/// Error raised by the order service.
#[derive(Debug, thiserror::Error)]
pub enum OrderServiceError {
    #[error("order not found")]
    NotFound,
    #[error("invalid order payload: {0}")]
    Validation(String),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    #[error(transparent)]
    Structuring(#[from] StructuringError),
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of recording a weight: the updated order plus the advisory
/// deviation verdict for the operator.
#[derive(Debug, Clone, Serialize)]
pub struct WeighedOrder {
    pub order: OrderView,
    pub verdict: WeightVerdict,
}

/// Service composing the store, the structuring collaborator, and the
/// vision collaborator into the order lifecycle.
pub struct OrderService<S, V> {
    store: Store,
    structuring: Arc<S>,
    vision: Arc<V>,
}

impl<S, V> OrderService<S, V>
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    pub fn new(store: Store, structuring: Arc<S>, vision: Arc<V>) -> Self {
        Self {
            store,
            structuring,
            vision,
        }
    }

    /// Full intake: hand the raw text to the structuring collaborator,
    /// then persist the result. Callers wanting fire-and-forget intake
    /// spawn this and answer immediately.
    pub async fn intake_text(
        &self,
        tenant: &TenantId,
        raw_text: &str,
    ) -> Result<OrderView, OrderServiceError> {
        let payload = self.structuring.structure(raw_text).await?;
        self.create_order(tenant, raw_text, payload).await
    }

    /// Create an order from an already-structured payload. Catalog
    /// resolution, estimation, the order graph, and the created event all
    /// commit in one transaction or not at all.
    pub async fn create_order(
        &self,
        tenant: &TenantId,
        raw_input: &str,
        payload: StructuredOrder,
    ) -> Result<OrderView, OrderServiceError> {
        validate_payload(&payload)?;

        let scoped = self.store.for_tenant(tenant.clone());
        let mut tx = scoped.begin().await?;
        let settings = tx.engine_settings().await?;

        let lines = resolver::resolve_lines(&mut tx, &payload.items, settings.match_mode)
            .await
            .map_err(flatten_resolution)?;
        let expected_weight_grams = estimator::expected_weight_grams(&lines);

        let now = Utc::now();
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                catalog_product_id: line.product.id,
                name: line.item.name.clone(),
                quantity: line.item.quantity,
                total_price_cents: to_minor_units(line.item.price),
                modifiers: line
                    .modifiers
                    .iter()
                    .map(|(modifier, row)| OrderItemModifier {
                        id: Uuid::new_v4(),
                        catalog_modifier_id: Some(row.id),
                        name: modifier.name.clone(),
                        total_price_cents: to_minor_units(modifier.price),
                    })
                    .collect(),
            })
            .collect();

        let order = Order {
            id: OrderId::new(),
            status: OrderStatus::PendingWeight,
            channel: payload.channel,
            check_number: payload.check_number.clone(),
            customer: payload.customer.clone(),
            subtotal_cents: to_minor_units(payload.subtotal),
            tax_cents: to_minor_units(payload.tax),
            total_cents: to_minor_units(payload.total),
            expected_weight_grams,
            actual_weight_grams: None,
            delta_weight_grams: None,
            raw_input: raw_input.to_string(),
            structured_snapshot: payload,
            weight_verified_at: None,
            visual_status: None,
            visual_result: None,
            visual_verified_at: None,
            archived_at: None,
            archived_reason: None,
            created_at: now,
            updated_at: now,
            items,
        };

        tx.insert_order(&order).await?;
        tx.append_event(
            &order.id,
            &OrderEventData::Created {
                item_count: order.items.len() as i64,
                expected_weight_grams,
                channel: order.channel,
            },
            None,
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(order.view())
    }

    pub async fn order(
        &self,
        tenant: &TenantId,
        id: &OrderId,
    ) -> Result<OrderView, OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        let order = scoped
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;
        Ok(order.view())
    }

    /// The order's ledger, oldest first.
    pub async fn order_events(
        &self,
        tenant: &TenantId,
        id: &OrderId,
    ) -> Result<Vec<OrderEvent>, OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        scoped
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;
        Ok(scoped.order_events(id).await?)
    }

    /// Record a measured weight for a pending order and move it to the
    /// target status. The returned verdict is advisory; it never blocks
    /// the transition.
    pub async fn record_weight(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        actual_grams: i64,
        target: WeighTarget,
        actor: Option<String>,
    ) -> Result<WeighedOrder, OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        let mut tx = scoped.begin().await?;
        let settings = tx.engine_settings().await?;
        let mut order = tx
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;

        if order.status != OrderStatus::PendingWeight {
            return Err(InvalidTransition {
                from: order.status,
                operation: "record a weight for",
            }
            .into());
        }

        let verdict = verification::analyze(
            actual_grams,
            order.expected_weight_grams,
            &order.items,
            settings.tolerance_grams,
        );
        let status = match target {
            WeighTarget::Completed => OrderStatus::Completed,
            WeighTarget::Weighed => OrderStatus::Weighed,
        };

        let now = Utc::now();
        tx.record_weight(id, actual_grams, verdict.delta_grams, status, now)
            .await?;
        tx.append_event(
            id,
            &OrderEventData::WeightVerified {
                actual_weight_grams: actual_grams,
                expected_weight_grams: order.expected_weight_grams,
                delta_weight_grams: verdict.delta_grams,
                outcome: verdict.status,
            },
            actor.as_deref(),
            now,
        )
        .await?;
        tx.commit().await?;

        order.status = status;
        order.actual_weight_grams = Some(actual_grams);
        order.delta_weight_grams = Some(verdict.delta_grams);
        order.weight_verified_at = Some(now);
        order.updated_at = now;

        Ok(WeighedOrder {
            order: order.view(),
            verdict,
        })
    }

    /// Step an order one stage back: `weighed` returns to the scale with
    /// its measurements cleared, `completed` steps back to `weighed` with
    /// measurements kept.
    pub async fn revert(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        actor: Option<String>,
    ) -> Result<OrderView, OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        let mut tx = scoped.begin().await?;
        let from = tx
            .order_status(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;

        let now = Utc::now();
        let to = match from {
            OrderStatus::Weighed => {
                tx.clear_weight(id, OrderStatus::PendingWeight, now).await?;
                OrderStatus::PendingWeight
            }
            OrderStatus::Completed => {
                tx.update_status(id, OrderStatus::Weighed, now).await?;
                OrderStatus::Weighed
            }
            other => {
                return Err(InvalidTransition {
                    from: other,
                    operation: "revert",
                }
                .into())
            }
        };

        tx.append_event(
            id,
            &OrderEventData::StatusChanged {
                from,
                to,
                reason: None,
            },
            actor.as_deref(),
            now,
        )
        .await?;
        tx.commit().await?;

        let order = scoped
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;
        Ok(order.view())
    }

    /// Park a weighed order in the locker staging area.
    pub async fn stage_for_lockers(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        actor: Option<String>,
    ) -> Result<OrderView, OrderServiceError> {
        self.transition(
            tenant,
            id,
            OrderStatus::Weighed,
            OrderStatus::ReadyForLockers,
            "stage",
            None,
            actor,
        )
        .await
    }

    /// Complete a batch of staged orders. Every id must name an order in
    /// `ready_for_lockers`; one mismatch aborts the whole batch.
    pub async fn batch_complete(
        &self,
        tenant: &TenantId,
        ids: &[OrderId],
        actor: Option<String>,
    ) -> Result<usize, OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        let mut tx = scoped.begin().await?;

        for id in ids {
            let status = tx
                .order_status(id)
                .await?
                .ok_or(OrderServiceError::NotFound)?;
            if status != OrderStatus::ReadyForLockers {
                return Err(InvalidTransition {
                    from: status,
                    operation: "batch-complete",
                }
                .into());
            }
        }

        let now = Utc::now();
        for id in ids {
            tx.update_status(id, OrderStatus::Completed, now).await?;
            tx.append_event(
                id,
                &OrderEventData::StatusChanged {
                    from: OrderStatus::ReadyForLockers,
                    to: OrderStatus::Completed,
                    reason: Some("batch completion".to_string()),
                },
                actor.as_deref(),
                now,
            )
            .await?;
        }
        tx.commit().await?;

        Ok(ids.len())
    }

    /// Cancel an order that has not reached a terminal status.
    pub async fn cancel(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        reason: Option<String>,
        actor: Option<String>,
    ) -> Result<OrderView, OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        let mut tx = scoped.begin().await?;
        let from = tx
            .order_status(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;

        if !from.is_open() {
            return Err(InvalidTransition {
                from,
                operation: "cancel",
            }
            .into());
        }

        let now = Utc::now();
        tx.update_status(id, OrderStatus::Cancelled, now).await?;
        tx.append_event(
            id,
            &OrderEventData::StatusChanged {
                from,
                to: OrderStatus::Cancelled,
                reason,
            },
            actor.as_deref(),
            now,
        )
        .await?;
        tx.commit().await?;

        let order = scoped
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;
        Ok(order.view())
    }

    /// Archive an order from any status. Repeating the call is a no-op:
    /// the guarded update skips rows that are already archived, so no
    /// second ledger row is written.
    pub async fn archive(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        reason: Option<String>,
        actor: Option<String>,
    ) -> Result<OrderView, OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        let mut tx = scoped.begin().await?;
        tx.order_status(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;

        let reason = reason.unwrap_or_else(|| "archived by operator".to_string());
        let now = Utc::now();
        if tx.archive_order(id, &reason, now).await? {
            tx.append_event(
                id,
                &OrderEventData::Archived { reason },
                actor.as_deref(),
                now,
            )
            .await?;
            tx.commit().await?;
        } else {
            // Release the connection before the reload below; on the
            // single-connection in-memory pool the reload deadlocks while
            // the open no-op transaction still holds it.
            drop(tx);
        }

        let order = scoped
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;
        Ok(order.view())
    }

    /// Bring an archived order back, to `restore_to` or `pending_weight`
    /// by default.
    pub async fn unarchive(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        restore_to: Option<OrderStatus>,
        actor: Option<String>,
    ) -> Result<OrderView, OrderServiceError> {
        let restored_to = restore_to.unwrap_or(OrderStatus::PendingWeight);
        if restored_to == OrderStatus::Archived {
            return Err(OrderServiceError::Validation(
                "cannot unarchive an order back into 'archived'".to_string(),
            ));
        }

        let scoped = self.store.for_tenant(tenant.clone());
        let mut tx = scoped.begin().await?;
        let from = tx
            .order_status(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;

        if from != OrderStatus::Archived {
            return Err(InvalidTransition {
                from,
                operation: "unarchive",
            }
            .into());
        }

        let now = Utc::now();
        tx.unarchive_order(id, restored_to, now).await?;
        tx.append_event(
            id,
            &OrderEventData::Unarchived { restored_to },
            actor.as_deref(),
            now,
        )
        .await?;
        tx.commit().await?;

        let order = scoped
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;
        Ok(order.view())
    }

    /// Archive every pending order untouched for the inactivity window,
    /// across all tenants, in bounded chunks. Each candidate is re-checked
    /// inside its chunk's transaction, so an order touched after selection
    /// survives. Returns how many orders were archived.
    pub async fn sweep_inactive(&self) -> Result<u64, OrderServiceError> {
        let cutoff = Utc::now() - Duration::hours(INACTIVITY_WINDOW_HOURS);
        let mut archived = 0u64;

        for tenant in self.store.tenants_with_stale_pending(cutoff).await? {
            let scoped = self.store.for_tenant(tenant);
            loop {
                let ids = scoped.stale_pending_ids(cutoff, SWEEP_CHUNK_SIZE).await?;
                if ids.is_empty() {
                    break;
                }

                let mut tx = scoped.begin().await?;
                let now = Utc::now();
                let mut chunk = 0u64;
                for id in &ids {
                    if tx.archive_if_stale(id, cutoff, SWEEP_REASON, now).await? {
                        tx.append_event(
                            id,
                            &OrderEventData::Archived {
                                reason: SWEEP_REASON.to_string(),
                            },
                            Some("system"),
                            now,
                        )
                        .await?;
                        chunk += 1;
                    }
                }
                tx.commit().await?;
                archived += chunk;

                // Every selected row raced away; the next selection would
                // return the same set, so stop rather than spin.
                if chunk == 0 {
                    break;
                }
            }
        }

        if archived > 0 {
            tracing::info!(archived, "archival sweep finished");
        }
        Ok(archived)
    }

    /// Dispatch the order and images to the vision collaborator and
    /// return immediately. The verdict lands through
    /// [`Self::complete_visual_verification`] semantics when the
    /// collaborator answers; until then the order is untouched.
    pub async fn request_visual_verification(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        images: Vec<String>,
    ) -> Result<(), OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        let order = scoped
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;
        let settings = scoped.engine_settings().await?;
        let prompt = visual::build_prompt(&order, &settings);

        let store = self.store.clone();
        let vision = Arc::clone(&self.vision);
        let tenant = tenant.clone();
        let order_id = *id;

        tokio::spawn(async move {
            match vision.verify(&prompt, &images).await {
                Ok(verdict) => {
                    if let Err(err) =
                        visual::apply_completion(&store, &tenant, &order_id, images, verdict).await
                    {
                        tracing::error!(order_id = %order_id, "failed to store visual verification: {err}");
                    }
                }
                Err(err) => {
                    tracing::warn!(order_id = %order_id, "vision collaborator failed: {err}");
                }
            }
        });

        Ok(())
    }

    /// Land a visual verification result on the order. Idempotent in the
    /// last-write-wins sense: the order row always reflects the latest
    /// completion, and every completion appends its own ledger row.
    pub async fn complete_visual_verification(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        images: Vec<String>,
        verdict: VisionVerdict,
    ) -> Result<OrderView, OrderServiceError> {
        let order = visual::apply_completion(&self.store, tenant, id, images, verdict).await?;
        Ok(order.view())
    }

    async fn transition(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        expected: OrderStatus,
        to: OrderStatus,
        operation: &'static str,
        reason: Option<String>,
        actor: Option<String>,
    ) -> Result<OrderView, OrderServiceError> {
        let scoped = self.store.for_tenant(tenant.clone());
        let mut tx = scoped.begin().await?;
        let from = tx
            .order_status(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;

        if from != expected {
            return Err(InvalidTransition { from, operation }.into());
        }

        let now = Utc::now();
        tx.update_status(id, to, now).await?;
        tx.append_event(
            id,
            &OrderEventData::StatusChanged { from, to, reason },
            actor.as_deref(),
            now,
        )
        .await?;
        tx.commit().await?;

        let order = scoped
            .load_order(id)
            .await?
            .ok_or(OrderServiceError::NotFound)?;
        Ok(order.view())
    }
}

fn validate_payload(payload: &StructuredOrder) -> Result<(), OrderServiceError> {
    for item in &payload.items {
        if item.name.trim().is_empty() {
            return Err(OrderServiceError::Validation(
                "line item name is empty".to_string(),
            ));
        }
        if item.quantity < 1 {
            return Err(OrderServiceError::Validation(format!(
                "line item '{}' has quantity {}",
                item.name, item.quantity
            )));
        }
        for modifier in &item.modifiers {
            if modifier.name.trim().is_empty() {
                return Err(OrderServiceError::Validation(format!(
                    "modifier on '{}' has an empty name",
                    item.name
                )));
            }
        }
    }
    Ok(())
}

/// Store failures inside resolution are persistence failures for the
/// taxonomy; only genuine unresolved names stay resolution errors.
fn flatten_resolution(err: ResolutionError) -> OrderServiceError {
    match err {
        ResolutionError::Store(inner) => OrderServiceError::Store(inner),
        other => OrderServiceError::Resolution(other),
    }
}

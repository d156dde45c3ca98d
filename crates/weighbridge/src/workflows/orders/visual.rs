//! Visual verification: prompt assembly, verdict classification, and the
//! completion command that lands collaborator results on an order.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::Utc;

use crate::store::Store;
use crate::workflows::orders::domain::{
    EngineSettings, Order, OrderEventData, OrderId, TenantId, VisionVerdict, VisualOutcome,
    VisualStatus,
};
use crate::workflows::orders::service::OrderServiceError;

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("vision backend failed: {0}")]
    Backend(String),
    #[error("vision backend returned an unusable payload: {0}")]
    InvalidPayload(String),
}

/// Judges submitted photos against the expected order contents.
#[async_trait]
pub trait VisionGateway: Send + Sync {
    async fn verify(&self, prompt: &str, images: &[String]) -> Result<VisionVerdict, VisionError>;
}

/// Confidence the collaborator must report before a matching verdict is
/// trusted as `verified`.
pub const VERIFIED_CONFIDENCE_FLOOR: u8 = 70;

/// Map a collaborator verdict to the persisted status. Precedence is
/// fixed: a wrong-order signal overrides everything, and discrepancy
/// lists override an unconvincing match.
pub fn classify_verdict(verdict: &VisionVerdict) -> VisualStatus {
    if verdict.wrong_order {
        VisualStatus::WrongImage
    } else if verdict.matched && verdict.confidence >= VERIFIED_CONFIDENCE_FLOOR {
        VisualStatus::Verified
    } else if !verdict.missing_items.is_empty() {
        VisualStatus::MissingItems
    } else if !verdict.extra_items.is_empty() {
        VisualStatus::ExtraItems
    } else {
        VisualStatus::Uncertain
    }
}

/// Build the collaborator prompt for an order. Tenants may override the
/// default wording with a template; `{check_number}` and `{items}` are
/// substituted into it.
pub fn build_prompt(order: &Order, settings: &EngineSettings) -> String {
    let mut listing = String::new();
    for item in &order.items {
        let _ = writeln!(listing, "- {}x {}", item.quantity, item.name);
        for modifier in &item.modifiers {
            let _ = writeln!(listing, "    * {}", modifier.name);
        }
    }
    let listing = listing.trim_end();

    match &settings.visual_prompt_template {
        Some(template) => template
            .replace("{check_number}", &order.check_number)
            .replace("{items}", listing),
        None => format!(
            "You are checking a packed takeout order against its ticket.\n\
             Ticket {} should contain:\n{}\n\
             Ticket quantities count order units; one unit may be a promotion \
             bundling several pieces.\n\
             Report whether the photographed items match the ticket, list anything \
             missing or unexpected, and flag photos that show a different order.",
            order.check_number, listing
        ),
    }
}

/// Land a completed visual verification: overwrite the order's visual
/// fields and append a ledger row, in one transaction. Safe to repeat;
/// the latest completion wins while the ledger keeps every attempt.
pub(crate) async fn apply_completion(
    store: &Store,
    tenant: &TenantId,
    order_id: &OrderId,
    images: Vec<String>,
    verdict: VisionVerdict,
) -> Result<Order, OrderServiceError> {
    let scoped = store.for_tenant(tenant.clone());

    let mut tx = scoped.begin().await?;
    tx.order_status(order_id)
        .await?
        .ok_or(OrderServiceError::NotFound)?;

    let status = classify_verdict(&verdict);
    let event = OrderEventData::VisualVerified {
        status,
        confidence: verdict.confidence,
        missing_items: verdict.missing_items.clone(),
        extra_items: verdict.extra_items.clone(),
        matched: verdict.matched,
        wrong_order: verdict.wrong_order,
    };
    let outcome = VisualOutcome {
        status,
        verdict,
        images,
    };

    let now = Utc::now();
    tx.record_visual(order_id, &outcome, now).await?;
    tx.append_event(order_id, &event, None, now).await?;
    tx.commit().await?;

    scoped
        .load_order(order_id)
        .await?
        .ok_or(OrderServiceError::NotFound)
}

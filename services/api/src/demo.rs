use crate::infra::{CannedVisionGateway, TicketPatternStructuring};
use clap::Args;
use std::sync::Arc;
use weighbridge::error::AppError;
use weighbridge::store::Store;
use weighbridge::workflows::orders::domain::{
    CatalogKind, Channel, Customer, OrderView, StructuredItem, StructuredModifier,
    StructuredOrder, TenantId, VisionVerdict, WeighTarget,
};
use weighbridge::workflows::orders::{OrderService, WeighedOrder};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Tenant id used for the demo data
    #[arg(long, default_value = "demo-kitchen")]
    pub(crate) tenant: String,
    /// Raw ticket text handed to the structuring gateway
    #[arg(long)]
    pub(crate) raw_text: Option<String>,
    /// Measured weight in grams for the weighing step
    #[arg(long)]
    pub(crate) actual_weight: Option<i64>,
    /// Skip the visual verification portion of the demo
    #[arg(long)]
    pub(crate) skip_visual: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        tenant,
        raw_text,
        actual_weight,
        skip_visual,
    } = args;

    let tenant = TenantId(tenant);
    let store = Store::open_in_memory().await?;
    let scoped = store.for_tenant(tenant.clone());

    println!("Order lifecycle demo (in-memory store)");
    println!("\nSeeded catalog for tenant '{tenant}'");
    for (kind, name, price_cents, weight_grams) in [
        (CatalogKind::Product, "Taco", 350i64, 170i64),
        (CatalogKind::Product, "Burrito", 895, 450),
        (CatalogKind::Modifier, "Extra Cheese", 95, 20),
        (CatalogKind::Modifier, "No Onions", 0, -30),
    ] {
        let row = scoped
            .upsert_catalog_item(kind, name, price_cents, weight_grams)
            .await?;
        println!(
            "- {} '{}': {} cents, {} g per unit",
            row.kind.label(),
            row.name,
            row.unit_price_cents,
            row.unit_weight_grams
        );
    }

    let service = OrderService::new(
        store,
        Arc::new(TicketPatternStructuring::default()),
        Arc::new(CannedVisionGateway),
    );

    println!("\nStructured order intake");
    let order = service.create_order(&tenant, "", demo_payload()).await?;
    print_order(&order);

    println!("\nFree-text intake through the structuring gateway");
    let raw = raw_text.unwrap_or_else(|| "2x Taco @ 7.00; 1x Burrito @ 8.95".to_string());
    println!("Ticket text: {raw}");
    let from_text = match service.intake_text(&tenant, &raw).await {
        Ok(order) => order,
        Err(err) => {
            println!("  Intake rejected: {err}");
            return Ok(());
        }
    };
    print_order(&from_text);

    println!("\nWeight verification");
    let expected = order.expected_weight_grams;
    let measured = actual_weight.unwrap_or(expected - 160);
    let weighed = service
        .record_weight(
            &tenant,
            &order.id,
            measured,
            WeighTarget::Weighed,
            Some("demo-scale".to_string()),
        )
        .await?;
    print_verdict(&weighed);

    println!("\nOperator re-check");
    let reverted = service
        .revert(&tenant, &order.id, Some("demo-scale".to_string()))
        .await?;
    println!("- reverted to {}", reverted.status);
    let reweighed = service
        .record_weight(
            &tenant,
            &order.id,
            expected - 20,
            WeighTarget::Weighed,
            Some("demo-scale".to_string()),
        )
        .await?;
    print_verdict(&reweighed);
    let staged = service
        .stage_for_lockers(&tenant, &order.id, Some("demo-runner".to_string()))
        .await?;
    println!("- staged: {}", staged.status);
    let completed = service
        .batch_complete(&tenant, &[order.id], Some("demo-runner".to_string()))
        .await?;
    println!("- batch completed {completed} order(s)");

    if !skip_visual {
        println!("\nVisual verification");
        let verdict = VisionVerdict {
            matched: true,
            confidence: 88,
            identified_items: vec!["Taco".to_string(), "Burrito".to_string()],
            missing_items: Vec::new(),
            extra_items: Vec::new(),
            wrong_order: false,
            notes: Some("demo verdict".to_string()),
        };
        let verified = service
            .complete_visual_verification(
                &tenant,
                &order.id,
                vec!["demo://ticket-4117.jpg".to_string()],
                verdict,
            )
            .await?;
        println!(
            "- visual status: {}",
            verified.visual_status.unwrap_or("unknown")
        );
    }

    println!("\nAudit ledger");
    let events = service.order_events(&tenant, &order.id).await?;
    for event in &events {
        println!(
            "- #{} {} by {}",
            event.id,
            event.data.kind(),
            event.actor.as_deref().unwrap_or("-")
        );
    }

    println!("\nHousekeeping on the free-text order");
    let cancelled = service
        .cancel(
            &tenant,
            &from_text.id,
            Some("demo teardown".to_string()),
            None,
        )
        .await?;
    println!("- cancelled: {}", cancelled.status);
    let archived = service.archive(&tenant, &from_text.id, None, None).await?;
    println!(
        "- archived: {} ({})",
        archived.status,
        archived.archived_reason.as_deref().unwrap_or("-")
    );

    Ok(())
}

fn demo_payload() -> StructuredOrder {
    StructuredOrder {
        channel: Channel::Delivery,
        check_number: "4117".to_string(),
        customer: Customer {
            name: "Dana Reyes".to_string(),
            email: None,
            phone: Some("555-0199".to_string()),
            address: Some("12 Pier Ave".to_string()),
        },
        items: vec![
            StructuredItem {
                name: "Taco".to_string(),
                quantity: 2,
                price: 7.00,
                modifiers: vec![StructuredModifier {
                    name: "No Onions".to_string(),
                    price: 0.0,
                }],
            },
            StructuredItem {
                name: "Burrito".to_string(),
                quantity: 1,
                price: 8.95,
                modifiers: vec![StructuredModifier {
                    name: "Extra Cheese".to_string(),
                    price: 0.95,
                }],
            },
        ],
        subtotal: 16.90,
        tax: 1.18,
        total: 18.08,
    }
}

fn print_order(order: &OrderView) {
    println!(
        "- order {} (check {}) -> status {}",
        order.id, order.check_number, order.status
    );
    println!(
        "  expected weight {} g | subtotal {} cents",
        order.expected_weight_grams, order.subtotal_cents
    );
    for item in &order.items {
        println!(
            "  - {}x {} ({} cents)",
            item.quantity, item.name, item.total_price_cents
        );
        for modifier in &item.modifiers {
            println!("    * {} ({} cents)", modifier.name, modifier.total_price_cents);
        }
    }
}

fn print_verdict(weighed: &WeighedOrder) {
    let verdict = &weighed.verdict;
    println!(
        "- measured {} g against {} g expected: {} (delta {} g, tolerance {} g) -> {}",
        weighed.order.actual_weight_grams.unwrap_or(0),
        weighed.order.expected_weight_grams,
        verdict.status.label(),
        verdict.delta_grams,
        verdict.tolerance_grams,
        verdict.action.label()
    );
    if let Some(suggestion) = &verdict.suggestion {
        match suggestion.confidence {
            Some(confidence) => {
                println!("  likely missing: {} ({}% confidence)", suggestion.name, confidence)
            }
            None => println!("  likely missing: {}", suggestion.name),
        }
    }
}

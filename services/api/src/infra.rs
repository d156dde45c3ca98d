use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use weighbridge::workflows::orders::domain::{
    Channel, Customer, StructuredItem, StructuredOrder, VisionVerdict,
};
use weighbridge::workflows::orders::{
    StructuringError, StructuringGateway, VisionError, VisionGateway,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Stand-in for the external text-structuring collaborator. Recognizes
/// order lines of the form `2x Taco @ 7.00`, separated by semicolons or
/// newlines; quantities default to 1 and prices to zero.
#[derive(Default)]
pub(crate) struct TicketPatternStructuring {
    checks_issued: AtomicU64,
}

#[async_trait]
impl StructuringGateway for TicketPatternStructuring {
    async fn structure(&self, raw_text: &str) -> Result<StructuredOrder, StructuringError> {
        let items: Vec<StructuredItem> = raw_text
            .split(['\n', ';'])
            .filter_map(parse_order_line)
            .collect();

        if items.is_empty() {
            return Err(StructuringError::InvalidPayload(format!(
                "no order lines recognized in {raw_text:?}"
            )));
        }

        let subtotal: f64 = items.iter().map(|item| item.price).sum();
        let check = 1001 + self.checks_issued.fetch_add(1, Ordering::Relaxed);

        Ok(StructuredOrder {
            channel: Channel::Takeout,
            check_number: check.to_string(),
            customer: Customer {
                name: "Walk-in".to_string(),
                email: None,
                phone: None,
                address: None,
            },
            items,
            subtotal,
            tax: 0.0,
            total: subtotal,
        })
    }
}

fn parse_order_line(segment: &str) -> Option<StructuredItem> {
    let segment = segment.trim();
    if segment.is_empty() {
        return None;
    }

    let (name_part, price) = match segment.split_once('@') {
        Some((name, price)) => (name.trim(), price.trim().parse::<f64>().unwrap_or(0.0)),
        None => (segment, 0.0),
    };

    let (quantity, name) = match name_part.split_once(char::is_whitespace) {
        Some((head, rest)) => {
            let digits = head.trim_end_matches(['x', 'X']);
            match digits.parse::<i64>() {
                Ok(quantity) if quantity > 0 => (quantity, rest.trim()),
                _ => (1, name_part),
            }
        }
        None => (1, name_part),
    };

    if name.is_empty() {
        return None;
    }

    Some(StructuredItem {
        name: name.to_string(),
        quantity,
        price,
        modifiers: Vec::new(),
    })
}

/// Stand-in for the external vision collaborator. Always reports a
/// confident match; deployments wire their own implementation.
#[derive(Default)]
pub(crate) struct CannedVisionGateway;

#[async_trait]
impl VisionGateway for CannedVisionGateway {
    async fn verify(
        &self,
        _prompt: &str,
        _images: &[String],
    ) -> Result<VisionVerdict, VisionError> {
        Ok(VisionVerdict {
            matched: true,
            confidence: 84,
            identified_items: Vec::new(),
            missing_items: Vec::new(),
            extra_items: Vec::new(),
            wrong_order: false,
            notes: Some("canned verdict; no image analysis performed".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_lines_parse_quantity_and_price() {
        let line = parse_order_line("  2x Carnitas Taco @ 7.50 ").expect("line parses");
        assert_eq!(line.name, "Carnitas Taco");
        assert_eq!(line.quantity, 2);
        assert_eq!(line.price, 7.50);

        let bare = parse_order_line("Horchata").expect("bare name parses");
        assert_eq!(bare.name, "Horchata");
        assert_eq!(bare.quantity, 1);
        assert_eq!(bare.price, 0.0);
    }

    #[tokio::test]
    async fn structuring_numbers_checks_and_rejects_noise() {
        let gateway = TicketPatternStructuring::default();
        let first = gateway
            .structure("2x Taco @ 7.00; 1x Burrito @ 8.95")
            .await
            .expect("ticket structures");
        assert_eq!(first.check_number, "1001");
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.subtotal, 15.95);

        let second = gateway.structure("Burrito @ 8.95").await.expect("ticket structures");
        assert_eq!(second.check_number, "1002");

        match gateway.structure("   ;;;   ").await {
            Err(StructuringError::InvalidPayload(_)) => {}
            other => panic!("expected an invalid payload error, got {other:?}"),
        }
    }
}

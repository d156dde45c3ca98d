use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::store::Store;
use crate::workflows::orders::domain::{
    CatalogKind, Channel, Customer, StructuredItem, StructuredModifier, StructuredOrder, TenantId,
    VisionVerdict,
};
use crate::workflows::orders::service::OrderService;
use crate::workflows::orders::structuring::{StructuringError, StructuringGateway};
use crate::workflows::orders::visual::{VisionError, VisionGateway};

pub(super) fn tenant() -> TenantId {
    TenantId("casa-feliz".to_string())
}

pub(super) fn other_tenant() -> TenantId {
    TenantId("el-otro".to_string())
}

pub(super) async fn seeded_store() -> Store {
    let store = Store::open_in_memory().await.expect("in-memory store");
    seed_catalog(&store, &tenant()).await;
    store
}

pub(super) async fn seed_catalog(store: &Store, tenant: &TenantId) {
    let scoped = store.for_tenant(tenant.clone());
    scoped
        .upsert_catalog_item(CatalogKind::Product, "Taco", 350, 170)
        .await
        .expect("seed taco");
    scoped
        .upsert_catalog_item(CatalogKind::Product, "Burrito", 895, 450)
        .await
        .expect("seed burrito");
    scoped
        .upsert_catalog_item(CatalogKind::Modifier, "Extra Cheese", 95, 20)
        .await
        .expect("seed extra cheese");
    scoped
        .upsert_catalog_item(CatalogKind::Modifier, "No Onions", 0, -30)
        .await
        .expect("seed no onions");
}

pub(super) fn customer() -> Customer {
    Customer {
        name: "Dana Reyes".to_string(),
        email: Some("dana@example.com".to_string()),
        phone: None,
        address: Some("12 Canal St".to_string()),
    }
}

pub(super) fn item(name: &str, quantity: i64, price: f64) -> StructuredItem {
    StructuredItem {
        name: name.to_string(),
        quantity,
        price,
        modifiers: Vec::new(),
    }
}

pub(super) fn modifier(name: &str, price: f64) -> StructuredModifier {
    StructuredModifier {
        name: name.to_string(),
        price,
    }
}

pub(super) fn payload(items: Vec<StructuredItem>) -> StructuredOrder {
    let subtotal: f64 = items
        .iter()
        .map(|line| line.price + line.modifiers.iter().map(|m| m.price).sum::<f64>())
        .sum();
    StructuredOrder {
        channel: Channel::Delivery,
        check_number: "1042".to_string(),
        customer: customer(),
        items,
        subtotal,
        tax: 0.0,
        total: subtotal,
    }
}

pub(super) fn burrito_payload() -> StructuredOrder {
    payload(vec![item("Burrito", 1, 8.95)])
}

pub(super) fn matching_verdict() -> VisionVerdict {
    VisionVerdict {
        matched: true,
        confidence: 92,
        identified_items: vec!["Burrito".to_string()],
        missing_items: Vec::new(),
        extra_items: Vec::new(),
        wrong_order: false,
        notes: None,
    }
}

pub(super) struct ScriptedStructuring {
    payload: Option<StructuredOrder>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedStructuring {
    pub(super) fn returning(payload: StructuredOrder) -> Self {
        Self {
            payload: Some(payload),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn failing() -> Self {
        Self {
            payload: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn seen(&self) -> Vec<String> {
        self.seen
            .lock()
            .expect("structuring mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl StructuringGateway for ScriptedStructuring {
    async fn structure(&self, raw_text: &str) -> Result<StructuredOrder, StructuringError> {
        self.seen
            .lock()
            .expect("structuring mutex poisoned")
            .push(raw_text.to_string());
        match &self.payload {
            Some(payload) => Ok(payload.clone()),
            None => Err(StructuringError::Backend("scripted outage".to_string())),
        }
    }
}

pub(super) struct ScriptedVision {
    verdict: Option<VisionVerdict>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedVision {
    pub(super) fn returning(verdict: VisionVerdict) -> Self {
        Self {
            verdict: Some(verdict),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn failing() -> Self {
        Self {
            verdict: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("vision mutex poisoned").clone()
    }
}

#[async_trait]
impl VisionGateway for ScriptedVision {
    async fn verify(&self, prompt: &str, _images: &[String]) -> Result<VisionVerdict, VisionError> {
        self.prompts
            .lock()
            .expect("vision mutex poisoned")
            .push(prompt.to_string());
        match &self.verdict {
            Some(verdict) => Ok(verdict.clone()),
            None => Err(VisionError::Backend("scripted outage".to_string())),
        }
    }
}

pub(super) async fn build_service() -> (OrderService<ScriptedStructuring, ScriptedVision>, Store) {
    build_service_with(
        Arc::new(ScriptedStructuring::returning(burrito_payload())),
        Arc::new(ScriptedVision::returning(matching_verdict())),
    )
    .await
}

pub(super) async fn build_service_with(
    structuring: Arc<ScriptedStructuring>,
    vision: Arc<ScriptedVision>,
) -> (OrderService<ScriptedStructuring, ScriptedVision>, Store) {
    let store = seeded_store().await;
    let service = OrderService::new(store.clone(), structuring, vision);
    (service, store)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 16)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::domain::{OrderId, OrderStatus, StructuredOrder, TenantId, VisionVerdict, WeighTarget};
use super::resolver::ResolutionError;
use super::service::{OrderService, OrderServiceError};
use super::structuring::StructuringGateway;
use super::visual::VisionGateway;

/// Router builder exposing the order lifecycle over HTTP.
pub fn order_router<S, V>(service: Arc<OrderService<S, V>>) -> Router
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    Router::new()
        .route(
            "/api/v1/tenants/:tenant/orders/intake",
            post(intake_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders",
            post(create_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/batch-complete",
            post(batch_complete_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id",
            get(get_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/events",
            get(events_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/weight",
            post(weight_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/revert",
            post(revert_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/stage",
            post(stage_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/cancel",
            post(cancel_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/archive",
            post(archive_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/unarchive",
            post(unarchive_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/visual",
            post(visual_request_handler::<S, V>),
        )
        .route(
            "/api/v1/tenants/:tenant/orders/:order_id/visual/complete",
            post(visual_complete_handler::<S, V>),
        )
        .route(
            "/api/v1/maintenance/archive-sweep",
            post(sweep_handler::<S, V>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct IntakeRequest {
    pub raw_text: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub raw_input: Option<String>,
    #[serde(flatten)]
    pub order: StructuredOrder,
}

#[derive(Debug, Deserialize)]
pub struct WeightRequest {
    pub actual_weight_grams: i64,
    #[serde(default)]
    pub target: WeighTarget,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActorRequest {
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnarchiveRequest {
    #[serde(default)]
    pub restore_to: Option<OrderStatus>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchCompleteRequest {
    pub order_ids: Vec<Uuid>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VisualRequest {
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VisualCompleteRequest {
    #[serde(default)]
    pub images: Vec<String>,
    pub verdict: VisionVerdict,
}

/// Accept raw order text and answer immediately; structuring and
/// persistence continue in the background.
pub(crate) async fn intake_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path(tenant): Path<String>,
    axum::Json(request): axum::Json<IntakeRequest>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    tokio::spawn(async move {
        if let Err(err) = service.intake_text(&tenant, &request.raw_text).await {
            tracing::error!(tenant = %tenant, "order intake failed: {err}");
        }
    });

    let payload = json!({ "accepted": true });
    (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
}

pub(crate) async fn create_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path(tenant): Path<String>,
    axum::Json(request): axum::Json<CreateOrderRequest>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    let raw_input = request.raw_input.unwrap_or_default();
    match service.create_order(&tenant, &raw_input, request.order).await {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    match service.order(&tenant, &OrderId(order_id)).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn events_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    match service.order_events(&tenant, &OrderId(order_id)).await {
        Ok(events) => (StatusCode::OK, axum::Json(events)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn weight_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    axum::Json(request): axum::Json<WeightRequest>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    match service
        .record_weight(
            &tenant,
            &OrderId(order_id),
            request.actual_weight_grams,
            request.target,
            request.actor,
        )
        .await
    {
        Ok(weighed) => (StatusCode::OK, axum::Json(weighed)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn revert_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    body: Option<axum::Json<ActorRequest>>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    let request = body.map(|axum::Json(value)| value).unwrap_or_default();
    match service
        .revert(&tenant, &OrderId(order_id), request.actor)
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn stage_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    body: Option<axum::Json<ActorRequest>>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    let request = body.map(|axum::Json(value)| value).unwrap_or_default();
    match service
        .stage_for_lockers(&tenant, &OrderId(order_id), request.actor)
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn batch_complete_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path(tenant): Path<String>,
    axum::Json(request): axum::Json<BatchCompleteRequest>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    let ids: Vec<OrderId> = request.order_ids.into_iter().map(OrderId).collect();
    match service.batch_complete(&tenant, &ids, request.actor).await {
        Ok(completed) => {
            let payload = json!({ "completed": completed });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    body: Option<axum::Json<ReasonRequest>>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    let request = body.map(|axum::Json(value)| value).unwrap_or_default();
    match service
        .cancel(&tenant, &OrderId(order_id), request.reason, request.actor)
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn archive_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    body: Option<axum::Json<ReasonRequest>>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    let request = body.map(|axum::Json(value)| value).unwrap_or_default();
    match service
        .archive(&tenant, &OrderId(order_id), request.reason, request.actor)
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn unarchive_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    body: Option<axum::Json<UnarchiveRequest>>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    let request = body.map(|axum::Json(value)| value).unwrap_or_default();
    match service
        .unarchive(
            &tenant,
            &OrderId(order_id),
            request.restore_to,
            request.actor,
        )
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Accept photos for verification and answer immediately; the verdict
/// lands on the order when the collaborator responds.
pub(crate) async fn visual_request_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    axum::Json(request): axum::Json<VisualRequest>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    match service
        .request_visual_verification(&tenant, &OrderId(order_id), request.images)
        .await
    {
        Ok(()) => {
            let payload = json!({ "accepted": true });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn visual_complete_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    axum::Json(request): axum::Json<VisualCompleteRequest>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    let tenant = TenantId(tenant);
    match service
        .complete_visual_verification(
            &tenant,
            &OrderId(order_id),
            request.images,
            request.verdict,
        )
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn sweep_handler<S, V>(
    State(service): State<Arc<OrderService<S, V>>>,
) -> Response
where
    S: StructuringGateway + 'static,
    V: VisionGateway + 'static,
{
    match service.sweep_inactive().await {
        Ok(archived) => {
            let payload = json!({ "archived": archived });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

fn error_response(err: OrderServiceError) -> Response {
    let status = match &err {
        OrderServiceError::NotFound => StatusCode::NOT_FOUND,
        OrderServiceError::Validation(_)
        | OrderServiceError::Resolution(ResolutionError::Unresolved { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        OrderServiceError::Transition(_) => StatusCode::CONFLICT,
        OrderServiceError::Structuring(_) | OrderServiceError::Vision(_) => StatusCode::BAD_GATEWAY,
        OrderServiceError::Resolution(ResolutionError::Store(_)) | OrderServiceError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}

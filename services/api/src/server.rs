use crate::cli::{ServeArgs, SweepArgs};
use crate::infra::{AppState, CannedVisionGateway, TicketPatternStructuring};
use crate::routes::with_order_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use weighbridge::config::AppConfig;
use weighbridge::error::AppError;
use weighbridge::store::Store;
use weighbridge::telemetry;
use weighbridge::workflows::orders::OrderService;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = open_store(&config).await?;
    let service = Arc::new(OrderService::new(
        store,
        Arc::new(TicketPatternStructuring::default()),
        Arc::new(CannedVisionGateway),
    ));

    let app = with_order_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "order lifecycle engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) async fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(path) = args.database {
        config.database.path = path;
    }

    telemetry::init(&config.telemetry)?;

    let store = open_store(&config).await?;
    let service = OrderService::new(
        store,
        Arc::new(TicketPatternStructuring::default()),
        Arc::new(CannedVisionGateway),
    );

    let archived = service.sweep_inactive().await?;
    info!(archived, "archive sweep complete");
    println!("archived {archived} stale pending orders");
    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Store, AppError> {
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Store::open(&config.database.path).await?)
}

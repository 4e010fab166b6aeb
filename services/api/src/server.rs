use crate::cli::ServeArgs;
use crate::infra::{build_services, seed_demo_store, AppState, LoggingDispatcher};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hireflow::clock::{Clock, SystemClock};
use hireflow::config::AppConfig;
use hireflow::error::AppError;
use hireflow::store::MemoryStore;
use hireflow::telemetry;
use hireflow::workflows::matching::{evidence_from_path, MatchingError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new());
    if args.seed_demo {
        seed_demo_store(&store, clock.today())?;
    }
    if let Some(path) = args.evidence.take() {
        let evidence = evidence_from_path(&path)?;
        let rows = evidence.len();
        for row in evidence {
            store.record_evidence(row).map_err(MatchingError::from)?;
        }
        info!(path = %path.display(), rows, "competency evidence loaded");
    }

    let dispatcher = Arc::new(LoggingDispatcher::default());
    let (pipeline, matching) = build_services(&config, store, dispatcher, clock);

    let app = with_pipeline_routes(pipeline, matching)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "hiring pipeline service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

//! Web server module for swift-exporter.
//!
//! Serves the landing page, the Prometheus telemetry endpoint and a
//! liveness probe.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::collector::{CollectorRegistry, RegistryError, ScrapeContext, ScrapeCoordinator};
use crate::config::WebConfig;
use crate::metrics::{CONTENT_TYPE, encode_text};
use crate::topology::TopologyStore;

/// Query parameter naming a collector to run.
const COLLECT_PARAM: &str = "collect";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CollectorRegistry>,
    pub coordinator: ScrapeCoordinator,
    pub topology: Arc<TopologyStore>,
    pub telemetry_path: String,
    max_requests: usize,
    limiter: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        registry: Arc<CollectorRegistry>,
        topology: Arc<TopologyStore>,
        web: &WebConfig,
    ) -> Self {
        let coordinator = ScrapeCoordinator::new(&registry.settings().namespace);
        Self {
            registry,
            coordinator,
            topology,
            telemetry_path: web.telemetry_path.clone(),
            max_requests: web.max_requests,
            limiter: Arc::new(Semaphore::new(web.max_requests)),
        }
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route(&telemetry_path, get(metrics_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(app_state)
}

/// Landing page linking to the telemetry path.
async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let version = env!("CARGO_PKG_VERSION");
    Html(format!(
        "<html>\n\
         <head><title>Swift Exporter {version}</title></head>\n\
         <body>\n\
         <h1>Swift Exporter {version}</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        path = state.telemetry_path,
    ))
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Run one scrape and render it in the text exposition format.
///
/// `collect` may be repeated to choose collectors; without it the default
/// set runs.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let Ok(_permit) = state.limiter.try_acquire() else {
        tracing::warn!(
            max_requests = state.max_requests,
            "Scrape rejected, too many concurrent requests"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "Limit of concurrent requests reached ({}), try again later.\n",
                state.max_requests
            ),
        )
            .into_response();
    };

    let names: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == COLLECT_PARAM)
        .map(|(_, value)| value)
        .collect();

    let collectors = match state.registry.resolve(&names) {
        Ok(collectors) => collectors,
        Err(e) => {
            tracing::warn!(
                error = %e,
                collectors = ?names,
                "Couldn't create filtered metrics handler"
            );
            let status = match e {
                RegistryError::Missing(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            return (
                status,
                format!("Couldn't create filtered metrics handler: {}", e),
            )
                .into_response();
        }
    };

    let snapshot = state.topology.snapshot_for_scrape().await;
    let samples = state
        .coordinator
        .scrape(collectors, ScrapeContext::new(snapshot))
        .await;

    match encode_text(&samples) {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

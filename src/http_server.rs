use axum::{
    Json, Router,
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::SystemTime};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    error::ServiceError,
    problem::ProblemDetails,
    service::{ReconcileMode, RecordRequest, SoaOverrides, ZoneService},
};

/// HTTP front end for the zone service
pub struct HttpServer {
    service: Arc<ZoneService>,
    base_path: String,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(service: Arc<ZoneService>, base_path: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            service,
            base_path: base_path.into(),
            bind_addr,
        }
    }

    /// Start the HTTP server
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = router(self.service, &self.base_path);

        info!(
            "Starting HTTP server on {} under {}",
            self.bind_addr, self.base_path
        );

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        let shutdown_signal = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
                return std::future::pending().await;
            }
            info!("Shutdown signal received, draining connections");
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    service: Arc<ZoneService>,
    startup_time: SystemTime,
}

/// Routes of the zone API mounted under `base_path`
pub fn router(service: Arc<ZoneService>, base_path: &str) -> Router {
    let state = AppState {
        service,
        startup_time: SystemTime::now(),
    };

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/api", get(list_zones))
        .route(
            "/api/{zone}",
            get(read_zone).post(create_zone).delete(delete_zone),
        )
        .route("/api/{zone}/record", axum::routing::post(add_record))
        .route(
            "/api/{zone}/record/{host}",
            axum::routing::delete(delete_record),
        )
        .route("/reconcile", get(report_reconcile).post(repair_reconcile));

    let base_path = base_path.trim_end_matches('/');
    let app = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(base_path, api)
    };

    app.fallback(unmapped).with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// Run a blocking service call off the async runtime and turn its outcome into a response
async fn run<T, F, R>(uri: &OriginalUri, call: F, respond: R) -> Response
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    R: FnOnce(T) -> Response,
{
    let outcome = match tokio::task::spawn_blocking(call).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Zone operation task failed: {}", e);
            Err(ServiceError::Internal("Zone operation aborted".to_string()))
        }
    };

    match outcome {
        Ok(value) => respond(value),
        Err(err) => ProblemDetails::from_error(&err, uri.0.path()).into_response(),
    }
}

/// Empty bodies decode as `T::default()`; anything else must be a JSON object of known fields
fn decode_optional<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    decode(body)
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, ServiceError> {
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::BadRequest(format!("Invalid request body: {}", e)))
}

fn empty_ok(_: impl Sized) -> Response {
    StatusCode::OK.into_response()
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state
        .startup_time
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0);

    (
        StatusCode::OK,
        Json(json!({"status": "healthy", "uptime_seconds": uptime})),
    )
}

async fn create_zone(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    uri: OriginalUri,
    body: Bytes,
) -> Response {
    let overrides = match decode_optional::<SoaOverrides>(&body) {
        Ok(overrides) => overrides,
        Err(err) => return ProblemDetails::from_error(&err, uri.0.path()).into_response(),
    };

    let service = state.service;
    run(&uri, move || service.create_zone(&zone, &overrides), empty_ok).await
}

async fn delete_zone(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    uri: OriginalUri,
) -> Response {
    let service = state.service;
    run(&uri, move || service.delete_zone(&zone), empty_ok).await
}

async fn read_zone(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    uri: OriginalUri,
) -> Response {
    let service = state.service;
    run(
        &uri,
        move || service.read_zone(&zone),
        |zone| Json(zone).into_response(),
    )
    .await
}

async fn list_zones(State(state): State<AppState>, uri: OriginalUri) -> Response {
    let service = state.service;
    run(
        &uri,
        move || service.list_zones(),
        |entries| Json(entries).into_response(),
    )
    .await
}

async fn add_record(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    uri: OriginalUri,
    body: Bytes,
) -> Response {
    let request = match decode::<RecordRequest>(&body) {
        Ok(request) => request,
        Err(err) => return ProblemDetails::from_error(&err, uri.0.path()).into_response(),
    };

    let service = state.service;
    run(&uri, move || service.add_record(&zone, &request), empty_ok).await
}

async fn delete_record(
    State(state): State<AppState>,
    Path((zone, host)): Path<(String, String)>,
    uri: OriginalUri,
) -> Response {
    let service = state.service;
    run(&uri, move || service.delete_record(&zone, &host), empty_ok).await
}

async fn report_reconcile(State(state): State<AppState>, uri: OriginalUri) -> Response {
    let service = state.service;
    run(
        &uri,
        move || service.reconcile(ReconcileMode::Report),
        |report| Json(report).into_response(),
    )
    .await
}

async fn repair_reconcile(State(state): State<AppState>, uri: OriginalUri) -> Response {
    let service = state.service;
    run(
        &uri,
        move || service.reconcile(ReconcileMode::Repair),
        |report| Json(report).into_response(),
    )
    .await
}

async fn unmapped(uri: OriginalUri) -> Response {
    ProblemDetails::unmapped(uri.0.path()).into_response()
}

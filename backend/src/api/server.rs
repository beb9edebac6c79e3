//! HTTP server exposing the warehouse to reporting tools.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | GET    | `/api/relations`  | Materialized relations               |
//! | GET    | `/api/revenue`    | `fact_monthly_revenue` rows          |
//! | GET    | `/api/forecast`   | `fact_monthly_revenue_forecast` rows |
//! | POST   | `/api/run`        | Run staging and mart models          |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{error_response, RunRequest, RunResponse, TableResponse};
use crate::config::Settings;
use crate::error::{ServerResult, WarehouseError};
use crate::models::{ForecastPoint, MonthlyRevenueFact, Relation};
use crate::transform::pipeline::run_models;
use crate::warehouse::RelationInfo;

type ApiError = (StatusCode, Json<Value>);

/// Shared server state
pub struct AppState {
    pub settings: Settings,
    /// Model runs replace relations; one at a time
    run_lock: Mutex<()>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            run_lock: Mutex::new(()),
        }
    }
}

/// Build the router
pub fn router(settings: Settings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/relations", get(relations))
        .route("/api/revenue", get(revenue))
        .route("/api/forecast", get(forecast))
        .route("/api/run", post(run))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(Arc::new(AppState::new(settings)))
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> ServerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let app = router(settings);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log_info(format!("Serving on http://localhost:{}", addr.port()));
    axum::serve(listener, app).await?;

    Ok(())
}

fn warehouse_error(e: WarehouseError) -> ApiError {
    let status = match e {
        WarehouseError::RelationNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error_response(&e.to_string())))
}

fn internal_error(message: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(&message.to_string())))
}

/// Read a relation off the async runtime
async fn read_relation<R>(state: Arc<AppState>, relation: Relation) -> Result<TableResponse<R>, ApiError>
where
    R: serde::de::DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || state.settings.warehouse().read_table::<R>(&relation))
        .await
        .map_err(internal_error)?
        .map(TableResponse::from)
        .map_err(warehouse_error)
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "saas-metrics",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn relations(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RelationInfo>>, ApiError> {
    tokio::task::spawn_blocking(move || state.settings.warehouse().list())
        .await
        .map_err(internal_error)?
        .map(Json)
        .map_err(warehouse_error)
}

async fn revenue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TableResponse<MonthlyRevenueFact>>, ApiError> {
    let relation = state.settings.mart_relation();
    read_relation(state, relation).await.map(Json)
}

async fn forecast(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TableResponse<ForecastPoint>>, ApiError> {
    let relation = state.settings.forecast_relation();
    read_relation(state, relation).await.map(Json)
}

/// Run models; the body is optional. Concurrent requests queue on the run lock.
async fn run(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> Result<Json<RunResponse>, ApiError> {
    let select = body.map(|Json(req)| req.select).unwrap_or_default();

    let _guard = state.run_lock.lock().await;
    let job = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let settings = &job.settings;
        run_models(&settings.warehouse(), settings, select)
    })
    .await
    .map_err(internal_error)?;

    Ok(Json(RunResponse::from(result)))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RAW_COLUMNS;
    use serde_json::json;
    use tempfile::tempdir;

    fn state_in(dir: &std::path::Path) -> Arc<AppState> {
        Arc::new(AppState::new(Settings {
            warehouse_dir: dir.to_path_buf(),
            ..Settings::default()
        }))
    }

    #[tokio::test]
    async fn test_revenue_not_found_before_run() {
        let dir = tempdir().unwrap();
        let err = revenue(State(state_in(dir.path()))).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    fn seed_raw(state: &AppState) {
        let rows: Vec<crate::models::RawSubscriptionRecord> = serde_json::from_value(json!([
            {"customer_id": 1, "subscription_start_date": "2024-01-15", "monthly_recurring_revenue": "100.00"},
            {"customer_id": 2, "subscription_start_date": "2024-02-05", "monthly_recurring_revenue": "75.00"}
        ]))
        .unwrap();
        let settings = &state.settings;
        settings
            .warehouse()
            .write_table(&settings.source_relation(), &RAW_COLUMNS, &rows, None)
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_then_revenue() {
        let dir = tempdir().unwrap();
        let state = state_in(dir.path());
        seed_raw(&state);

        let Json(response) = run(State(state.clone()), None).await.unwrap();
        assert_eq!(response.status, "success");

        let Json(table) = revenue(State(state.clone())).await.unwrap();
        assert_eq!(table.row_count, 2);

        let Json(listed) = relations(State(state)).await.unwrap();
        assert_eq!(listed.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_all_succeed() {
        let dir = tempdir().unwrap();
        let state = state_in(dir.path());
        seed_raw(&state);

        let runs: Vec<_> = (0..8)
            .map(|_| tokio::spawn(run(State(state.clone()), None)))
            .collect();
        for handle in runs {
            let Json(response) = handle.await.unwrap().unwrap();
            assert_eq!(response.status, "success");
        }

        let Json(table) = revenue(State(state)).await.unwrap();
        assert_eq!(table.row_count, 2);
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }
}

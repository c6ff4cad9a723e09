use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tally_api::{ApiError, CalculateRequest, CalculatorApi};
use tally_core::CalculationRecord;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: CalculatorApi,
}

#[derive(Debug, Clone, Serialize)]
struct CalculateResponse {
    result: f64,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug, Clone)]
struct ServiceError {
    status: StatusCode,
    detail: String,
}

#[derive(Debug, Parser)]
#[command(name = "tally-service")]
#[command(about = "HTTP calculation service with persisted history")]
struct Args {
    #[arg(long, default_value = "./tally.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
}

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        let status = match err {
            ApiError::Eval(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, detail: err.to_string() }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/calculate", post(calculate))
        .route("/history", get(history))
        .route("/health", get(health))
        .route("/openapi", get(openapi))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let state = ServiceState { api: CalculatorApi::new(args.db.clone()) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!("calculation service listening on {} (db: {})", args.bind, args.db.display());
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn calculate(
    State(state): State<ServiceState>,
    Json(request): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>, ServiceError> {
    let record = state.api.calculate(request).map_err(ServiceError::from)?;
    Ok(Json(CalculateResponse { result: record.result }))
}

async fn history(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<CalculationRecord>>, ServiceError> {
    let records = state.api.history().map_err(ServiceError::from)?;
    Ok(Json(records))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

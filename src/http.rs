use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

use crate::{
    error::{ServiceError, StorageError, ValidationError},
    models::{
        parse_date,
        read::ReplaceOutcome,
        write::{CandidateExpense, SummaryRequest},
    },
    service::ExpenseService,
    telemetry,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExpenseService>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: Arc<ExpenseService>) -> Self {
        Self {
            service,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/expenses", get(get_expenses).put(replace_expenses))
        .route(
            "/expenses/:date",
            get(get_expenses_at).put(replace_expenses_at).post(replace_expenses_at),
        )
        .route("/summary", post(summary))
        .route("/analytics", post(summary))
        .route_layer(middleware::from_fn(telemetry::track_requests))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("request worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Service(ServiceError::Validation(e))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Service(ServiceError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::Storage(StorageError::Unavailable(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Service(ServiceError::Storage(StorageError::Overflow(_))) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Service(ServiceError::Storage(StorageError::CorruptRecord(_)))
            | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "Request failed");
        } else {
            tracing::debug!(%status, error = %self, "Request rejected");
        }
        (
            status,
            Json(ErrorBody {
                success: false,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct ReplaceResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(flatten)]
    pub outcome: ReplaceOutcome,
}

/// Storage calls are synchronous; keep them off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

fn query_date(query: Result<Query<DateQuery>, QueryRejection>) -> Result<Date, ValidationError> {
    let Query(query) = query.map_err(|e| ValidationError::MalformedRequest(e.body_text()))?;
    parse_date("date", &query.date)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ValidationError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ValidationError::MalformedRequest(e.body_text()))
}

async fn fetch(state: AppState, date: Date) -> Result<Response, ApiError> {
    let service = state.service.clone();
    let records = run_blocking(move || service.fetch_expenses_for_date(date)).await?;
    Ok(Json(records).into_response())
}

async fn replace(
    state: AppState,
    date: Date,
    candidates: Vec<CandidateExpense>,
) -> Result<Response, ApiError> {
    let service = state.service.clone();
    let outcome = run_blocking(move || service.replace_expenses_for_date(date, candidates)).await?;
    Ok(Json(ReplaceResponse {
        success: true,
        message: "Expenses updated successfully",
        outcome,
    })
    .into_response())
}

async fn get_expenses(
    State(state): State<AppState>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    fetch(state, query_date(query)?).await
}

async fn get_expenses_at(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Response, ApiError> {
    fetch(state, parse_date("date", &date)?).await
}

async fn replace_expenses(
    State(state): State<AppState>,
    query: Result<Query<DateQuery>, QueryRejection>,
    payload: Result<Json<Vec<CandidateExpense>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let date = query_date(query)?;
    replace(state, date, body(payload)?).await
}

async fn replace_expenses_at(
    State(state): State<AppState>,
    Path(date): Path<String>,
    payload: Result<Json<Vec<CandidateExpense>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let date = parse_date("date", &date)?;
    replace(state, date, body(payload)?).await
}

async fn summary(
    State(state): State<AppState>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let range = body(payload)?.validate()?;
    let service = state.service.clone();
    let summary = run_blocking(move || service.summarize(range)).await?;
    Ok(Json(summary.categories).into_response())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

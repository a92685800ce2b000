//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use boxcheck_core::{Error, FailureSignal, Label, Record};
use boxcheck_memory::{DriftAlert, StoreStatistics};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::state::AppState;

/// Default record count for `/v1/history`
const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Default preview size for `/v1/training-data`
const DEFAULT_PREVIEW_LIMIT: usize = 3;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/classify", post(classify))
        .route("/v1/feedback", post(feedback))
        .route("/v1/statistics", get(statistics))
        .route("/v1/training-data", get(training_data))
        .route("/v1/export", post(export))
        .route("/v1/history", get(history))
        .route("/v1/alerts", get(alerts))
        .route("/v1/reset", post(reset))
        .fallback(fallback)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
}

#[derive(Debug, Serialize)]
struct ClassifyResponse {
    condition: Label,
    confidence: f64,
    reason: String,
    damage_types: Vec<String>,
    should_review: bool,
    record_id: u64,
    context_examples: usize,
    attempts: u32,
}

async fn classify(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ClassifyResponse>, ApiError> {
    if body.is_empty() {
        return Err(Error::invalid_input("request body must contain image bytes").into());
    }

    debug!("Classify request with {} bytes", body.len());
    let evaluation = state.orchestrator.evaluate(&body).await?;
    let record = evaluation.record;

    Ok(Json(ClassifyResponse {
        condition: record.label,
        confidence: record.confidence,
        reason: record.reason,
        damage_types: record.damage_types,
        should_review: evaluation.should_review,
        record_id: record.id,
        context_examples: evaluation.context_examples,
        attempts: evaluation.attempts,
    }))
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    label: String,
    #[serde(default)]
    image_ref: Option<String>,
    #[serde(default)]
    reviewer: Option<String>,
}

async fn feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Record>, ApiError> {
    let label: Label = request.label.parse()?;
    let record = state
        .orchestrator
        .submit_feedback(label, request.image_ref, request.reviewer.as_deref())
        .await?;
    Ok(Json(record))
}

async fn statistics(State(state): State<AppState>) -> Json<StoreStatistics> {
    Json(state.store.statistics())
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct TrainingDataResponse {
    available_samples: usize,
    ready_for_training: bool,
    sample_preview: Vec<Record>,
}

async fn training_data(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<TrainingDataResponse> {
    let available_samples = state.store.corpus_len();
    let floor = state.store.settings().retraining_sample_floor;

    Json(TrainingDataResponse {
        available_samples,
        ready_for_training: available_samples >= floor,
        sample_preview: state
            .store
            .corpus_preview(query.limit.unwrap_or(DEFAULT_PREVIEW_LIMIT)),
    })
}

async fn export(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let path = state.config.export_path();
    let store = state.store.clone();
    let target = path.clone();

    let samples = tokio::task::spawn_blocking(move || store.export_to_file(&target))
        .await
        .map_err(join_error)??;

    debug!("Export request wrote {} examples", samples);
    Ok(Json(json!({
        "status": "success",
        "file": path.display().to_string(),
        "samples": samples,
    })))
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    total: usize,
    recent: Vec<Record>,
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<HistoryResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(HistoryResponse {
        total: state.store.len(),
        recent: state.store.recent(limit),
    })
}

async fn alerts(State(state): State<AppState>) -> Json<Vec<DriftAlert>> {
    Json(state.store.drift_alerts())
}

#[derive(Debug, Default, Deserialize)]
struct ResetRequest {
    #[serde(default)]
    confirm: bool,
}

async fn reset(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: ResetRequest = if body.is_empty() {
        ResetRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::invalid_input(format!("malformed reset request: {e}")))?
    };

    if !request.confirm {
        return Err(Error::invalid_input("reset requires {\"confirm\": true}").into());
    }

    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.reset())
        .await
        .map_err(join_error)??;

    warn!("Experience store reset via API");
    Ok(Json(json!({
        "status": "success",
        "message": "Memory reset complete",
    })))
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Storage(std::io::Error::other(err.to_string()))
}

/// Error handling
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let signal = self.0.signal();
        let status = match signal {
            FailureSignal::TryAgain => StatusCode::BAD_GATEWAY,
            FailureSignal::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            FailureSignal::BadRequest => StatusCode::BAD_REQUEST,
        };

        match signal {
            FailureSignal::BadRequest => debug!("Rejected request: {}", self.0),
            _ => error!("Request failed: {}", self.0),
        }

        let body = json!({
            "error": {
                "message": self.0.to_string(),
                "signal": signal,
            }
        });

        (status, Json(body)).into_response()
    }
}

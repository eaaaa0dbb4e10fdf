use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::coverage::CoverageReport;
use crate::error::EvaluationError;
use crate::evaluator::{Evaluator, DEFAULT_SEARCH_LIMIT};
use crate::interactions::InteractionSummary;
use crate::output::json::fingerprint;
use crate::report::{AlternativesEntry, Prescription, PrescriptionReport};
use crate::sources::DrugSummary;

#[derive(Clone)]
pub struct ApiState {
    config: Config,
    evaluator: Evaluator,
}

impl ApiState {
    pub fn new(config: Config, evaluator: Evaluator) -> Self {
        Self { config, evaluator }
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct StampedResponse<T: Serialize> {
    ok: bool,
    data: T,
    fingerprint: String,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    retryable: bool,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    kind: Option<&'static str>,
    retryable: bool,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            kind: None,
            retryable: false,
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
            kind: None,
            retryable: false,
        }
    }
}

impl From<EvaluationError> for ApiError {
    fn from(error: EvaluationError) -> Self {
        let status = if error.is_invalid_input() {
            StatusCode::BAD_REQUEST
        } else if error.is_retryable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status == StatusCode::SERVICE_UNAVAILABLE {
            warn!("{error}");
        }
        Self {
            status,
            message: error.to_string(),
            kind: Some(error.kind()),
            retryable: error.is_retryable(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
            kind: self.kind,
            retryable: self.retryable,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;
type Body = std::result::Result<Json<Prescription>, JsonRejection>;

#[derive(Debug, Clone, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/v1/config", get(show_config))
        .route("/v1/drugs/search", get(search))
        .route("/v1/alternatives", post(alternatives))
        .route("/v1/interactions", post(interactions))
        .route("/v1/coverage", post(coverage))
        .route("/v1/evaluate", post(evaluate))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let evaluator = Evaluator::from_config(&config)?;
    let app = router(ApiState::new(config, evaluator));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse { status: "ok" })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn search(
    State(state): State<ApiState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<DrugSummary>> {
    let query = params.q.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(ApiError::bad_request("query parameter q is required"));
    }
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(ok(state.evaluator.search(&query, limit).await?))
}

async fn alternatives(
    State(state): State<ApiState>,
    body: Body,
) -> ApiResult<Vec<AlternativesEntry>> {
    let Json(prescription) = body?;
    let insurance = prescription.insurance_or(state.evaluator.default_insurance());
    let entries = state
        .evaluator
        .alternatives_for_all(&prescription.medications, &insurance)
        .await?;
    Ok(ok(entries))
}

async fn interactions(
    State(state): State<ApiState>,
    body: Body,
) -> ApiResult<InteractionSummary> {
    let Json(prescription) = body?;
    Ok(ok(state
        .evaluator
        .check_interactions(&prescription.medications)
        .await?))
}

async fn coverage(State(state): State<ApiState>, body: Body) -> ApiResult<CoverageReport> {
    let Json(prescription) = body?;
    let insurance = prescription.insurance_or(state.evaluator.default_insurance());
    Ok(ok(state
        .evaluator
        .reconcile_coverage(&prescription.medications, &insurance)
        .await?))
}

async fn evaluate(
    State(state): State<ApiState>,
    body: Body,
) -> std::result::Result<Json<StampedResponse<PrescriptionReport>>, ApiError> {
    let Json(prescription) = body?;
    let report = state.evaluator.evaluate_prescription(&prescription).await?;
    let fingerprint = fingerprint(&report).map_err(ApiError::internal)?;
    Ok(Json(StampedResponse {
        ok: true,
        data: report,
        fingerprint,
        generated_at: Utc::now(),
    }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

//! Axum route handlers for the affinity service.
//!
//! # Routes
//!
//! - `GET  /health`: Returns `{"status": "ok", "version": ...}`
//! - `GET  /affinity/:id`: Status view for one identity
//! - `POST /affinity/:id/delta`: Apply a scored event
//! - `GET  /affinity/:id/persona`: Persona info and effective prompt
//! - `POST /affinity/:id/persona`: Request a generated custom persona
//! - `POST /affinity/:id/persona/restore`: Restore the persona captured at excursion entry
//! - `POST /affinity/:id/persona/reset`: Re-roll a built-in persona
//! - `POST /transfer`: Hedge affinity from one identity to another
//! - `POST /transfer/quote`: Balances and allowed range, no mutation
//! - `POST /admin/affinity/:id/reset`: Reset one record to defaults
//! - `POST /admin/rewards/:period`: Run the reward cycle for a period
//! - `GET  /rewards`: Archived period keys
//! - `GET  /rewards/:period`: Leaderboard of an archived period

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::AffinityEngine;
use crate::error::{PersonaChangeError, RewardError, StoreError, TransferError};

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AffinityEngine>,
}

impl AppState {
    pub fn new(engine: Arc<AffinityEngine>) -> Self {
        Self { engine }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
}

fn transfer_error(err: TransferError) -> ApiError {
    let status = match err {
        TransferError::UnknownTarget { .. } => StatusCode::NOT_FOUND,
        TransferError::Ambiguous { .. } => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    };
    api_error(status, err)
}

fn persona_error(err: PersonaChangeError) -> ApiError {
    let status = match err {
        PersonaChangeError::ScoreTooLow { .. } => StatusCode::FORBIDDEN,
        PersonaChangeError::NothingToRestore => StatusCode::CONFLICT,
        PersonaChangeError::EmptyRequest => StatusCode::BAD_REQUEST,
        PersonaChangeError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
    };
    api_error(status, err)
}

fn reward_error(err: RewardError) -> ApiError {
    let status = match err {
        RewardError::EmptySnapshot => StatusCode::UNPROCESSABLE_ENTITY,
        RewardError::MissingArchive { .. } => StatusCode::NOT_FOUND,
        RewardError::Store(StoreError::ArchiveExists { .. }) => StatusCode::CONFLICT,
        RewardError::Store(StoreError::InvalidPeriod { .. }) => StatusCode::BAD_REQUEST,
        RewardError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err)
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/affinity/:id", get(status_handler))
        .route("/affinity/:id/delta", post(delta_handler))
        .route(
            "/affinity/:id/persona",
            get(persona_handler).post(custom_persona_handler),
        )
        .route("/affinity/:id/persona/restore", post(restore_persona_handler))
        .route("/affinity/:id/persona/reset", post(reset_persona_handler))
        .route("/transfer", post(transfer_handler))
        .route("/transfer/quote", post(quote_handler))
        .route("/admin/affinity/:id/reset", post(reset_identity_handler))
        .route("/admin/rewards/:period", post(run_rewards_handler))
        .route("/rewards", get(periods_handler))
        .route("/rewards/:period", get(rewards_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health: liveness check.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "affinity-engine",
    }))
}

async fn status_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    Json(state.engine.status(&id))
}

#[derive(Debug, Deserialize)]
struct DeltaRequest {
    raw_delta: f64,
    /// Overrides the multiplier derived from the identity's persona.
    #[serde(default)]
    persona_multiplier: Option<f64>,
}

/// POST /affinity/:id/delta
///
/// Request: `{ "raw_delta": 3.0, "persona_multiplier": 1.6? }`
async fn delta_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DeltaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !request.raw_delta.is_finite() {
        return Err(api_error(StatusCode::BAD_REQUEST, "raw_delta must be finite"));
    }
    let outcome = match request.persona_multiplier {
        Some(multiplier) => state.engine.apply_delta(&id, multiplier, request.raw_delta),
        None => state.engine.record_interaction(&id, request.raw_delta),
    };
    if !outcome.notification.is_empty() {
        tracing::info!(identity = %id, "{}", outcome.notification);
    }
    Ok(Json(outcome))
}

async fn persona_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let prompt = state.engine.persona_prompt(&id);
    Json(serde_json::json!({
        "info": state.engine.persona_info(&id),
        "prompt": prompt,
    }))
}

#[derive(Debug, Deserialize)]
struct CustomPersonaRequest {
    request: String,
}

/// POST /affinity/:id/persona: `{ "request": "a calm lighthouse keeper" }`
async fn custom_persona_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CustomPersonaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state
        .engine
        .request_custom_persona(&id, &request.request)
        .await
        .map_err(persona_error)?;
    Ok(Json(info))
}

async fn restore_persona_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state
        .engine
        .restore_original_persona(&id)
        .map_err(persona_error)?;
    Ok(Json(info))
}

async fn reset_persona_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let index = state.engine.reset_persona(&id);
    Json(serde_json::json!({ "builtin_index": index }))
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    source: String,
    target: String,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct QuoteRequest {
    source: String,
    target: String,
}

/// POST /transfer: `{ "source": "alice", "target": "bo", "amount": 50.0 }`
async fn transfer_handler(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .engine
        .transfer(&request.source, &request.target, request.amount)
        .map_err(transfer_error)?;
    Ok(Json(serde_json::json!({
        "receipt": receipt,
        "message": receipt.to_string(),
    })))
}

async fn quote_handler(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state
        .engine
        .transfer_quote(&request.source, &request.target)
        .map_err(transfer_error)?;
    Ok(Json(serde_json::json!({
        "quote": quote,
        "message": quote.to_string(),
    })))
}

async fn reset_identity_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.engine.reset_identity(&id) {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No affinity record for {}", id),
        ));
    }
    Ok(Json(serde_json::json!({ "reset": id })))
}

async fn run_rewards_handler(
    State(state): State<AppState>,
    Path(period): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .engine
        .run_reward_cycle(&period)
        .map_err(reward_error)?;
    tracing::info!(period = %period, winners = report.winners.len(), "Reward cycle complete");
    Ok(Json(serde_json::json!({
        "report": report,
        "message": report.to_string(),
    })))
}

async fn periods_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let periods = state.engine.archived_periods().map_err(reward_error)?;
    Ok(Json(serde_json::json!({ "periods": periods })))
}

async fn rewards_handler(
    State(state): State<AppState>,
    Path(period): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .engine
        .rewards_for_period(&period)
        .map_err(reward_error)?;
    Ok(Json(serde_json::json!({
        "report": report,
        "message": report.to_string(),
    })))
}

// src/api.rs
use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::limiter::{CooldownInfo, RateLimiter};
use crate::orchestrator::ResolutionOrchestrator;
use crate::types::{Loan, Resolution};

/// Upper bound on loans per `/resolve/batch` request.
pub const MAX_BATCH: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ResolutionOrchestrator>,
    pub limiter: Arc<RateLimiter>,
}

impl From<crate::bootstrap::Runtime> for AppState {
    fn from(rt: crate::bootstrap::Runtime) -> Self {
        Self {
            orchestrator: rt.orchestrator,
            limiter: rt.limiter,
        }
    }
}

/// Service routes. `/metrics` is merged in by the binary, which owns the recorder.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/resolve", post(resolve))
        .route("/resolve/batch", post(resolve_batch))
        .route("/debug/cooldowns", get(debug_cooldowns))
        .route("/debug/cooldowns/{provider}", delete(clear_cooldown))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn resolve(State(state): State<AppState>, Json(loan): Json<Loan>) -> Json<Resolution> {
    Json(state.orchestrator.resolve(&loan).await)
}

async fn resolve_batch(
    State(state): State<AppState>,
    Json(loans): Json<Vec<Loan>>,
) -> Result<Json<Vec<Resolution>>, (StatusCode, String)> {
    if loans.len() > MAX_BATCH {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("batch of {} exceeds {MAX_BATCH} loans", loans.len()),
        ));
    }
    Ok(Json(state.orchestrator.resolve_many(loans).await))
}

async fn debug_cooldowns(State(state): State<AppState>) -> Json<Vec<CooldownInfo>> {
    Json(state.limiter.active_cooldowns())
}

async fn clear_cooldown(State(state): State<AppState>, Path(provider): Path<String>) -> StatusCode {
    state.limiter.clear(&provider);
    StatusCode::NO_CONTENT
}

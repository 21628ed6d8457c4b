use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::item::{Category, Item};
use crate::pipeline::CycleStage;
use crate::store::{ListQuery, StoreError, TrendStore, ACTIVE_KEY};
use crate::worker::{CycleTrigger, TriggerOutcome};

const MAX_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn TrendStore>,
    trigger: CycleTrigger,
    stage: watch::Receiver<CycleStage>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TrendStore>,
        trigger: CycleTrigger,
        stage: watch::Receiver<CycleStage>,
    ) -> Self {
        Self {
            store,
            trigger,
            stage,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trends", get(trends))
        .route("/stats", get(stats))
        .route("/settings", post(update_setting))
        .route("/reports", get(reports))
        .route("/run-cycle", post(run_cycle))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

enum ApiError {
    Store(StoreError),
    BadRequest(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Store(e) => {
                tracing::error!(error = %e, "store error in api");
                (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable".to_string())
            }
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
        };
        (status, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    stage: CycleStage,
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    let status = match state.store.is_active().await {
        Ok(true) => "active",
        Ok(false) => "paused",
        Err(_) => "unknown",
    };
    let stage = *state.stage.borrow();
    Json(HealthOut { status, stage })
}

#[derive(Deserialize)]
struct TrendsParams {
    limit: Option<usize>,
    category: Option<String>,
}

async fn trends(
    State(state): State<AppState>,
    Query(p): Query<TrendsParams>,
) -> ApiResult<Json<Vec<Item>>> {
    let mut query = ListQuery::top(p.limit.unwrap_or(50).min(MAX_LIMIT));
    match p.category.as_deref().map(str::trim) {
        None | Some("") => {}
        Some(c) if c.eq_ignore_ascii_case("all") => {}
        Some(c) => {
            let cat: Category = c.parse().map_err(|e| ApiError::BadRequest(format!("{e}")))?;
            query = query.in_category(cat);
        }
    }
    Ok(Json(state.store.list(&query).await?))
}

#[derive(Serialize)]
struct StatsOut {
    total_analyzed: usize,
    notified: usize,
    bot_active: bool,
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsOut>> {
    let s = state.store.stats().await?;
    let bot_active = state.store.is_active().await?;
    Ok(Json(StatsOut {
        total_analyzed: s.total_items,
        notified: s.notified_items,
        bot_active,
    }))
}

#[derive(Deserialize)]
struct SettingReq {
    key: String,
    value: String,
}

#[derive(Serialize)]
struct SettingOut {
    status: &'static str,
    key: String,
    value: String,
}

async fn update_setting(
    State(state): State<AppState>,
    Json(req): Json<SettingReq>,
) -> ApiResult<Json<SettingOut>> {
    let key = req.key.trim();
    if key.is_empty() {
        return Err(ApiError::BadRequest("key must not be empty".into()));
    }
    state.store.set_setting(key, &req.value).await?;
    if key == ACTIVE_KEY {
        tracing::info!(value = %req.value, "active toggle updated");
    }
    Ok(Json(SettingOut {
        status: "success",
        key: key.to_string(),
        value: req.value,
    }))
}

#[derive(Deserialize)]
struct ReportsParams {
    limit: Option<usize>,
}

async fn reports(
    State(state): State<AppState>,
    Query(p): Query<ReportsParams>,
) -> ApiResult<Json<Vec<Item>>> {
    let limit = p.limit.unwrap_or(20).min(MAX_LIMIT);
    Ok(Json(state.store.reports(limit).await?))
}

async fn run_cycle(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.trigger.trigger() {
        TriggerOutcome::Queued => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "queued" })),
        ),
        TriggerOutcome::AlreadyQueued => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "already_queued" })),
        ),
        TriggerOutcome::Stopped => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "stopped" })),
        ),
    }
}

// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  Handlers are thin: each one forwards
// to an AppState method and serialises the result.  View commands answer with
// the freshly rendered MarketPage so a client never needs a second request.
//
// CORS is configured permissively; the dashboard is served from a different
// origin during development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::app_state::{AppState, PageStep};
use crate::calculator::{AmountInput, ProfitScenario, DEFAULT_INVESTMENT, DEFAULT_TARGET_MULTIPLIER};
use crate::market_data::ProviderError;
use crate::types::SortKey;
use crate::watchlist::RemoteIdentity;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        // ── Market table ────────────────────────────────────────────
        .route("/api/v1/markets", get(markets))
        .route("/api/v1/markets/reload", post(reload))
        .route("/api/v1/view/search", post(set_search))
        .route("/api/v1/view/favorites-only", post(set_favorites_only))
        .route("/api/v1/view/sort", post(toggle_sort))
        .route("/api/v1/view/page", post(set_page))
        // ── Detail ──────────────────────────────────────────────────
        .route("/api/v1/coins/:id", get(coin_detail))
        .route("/api/v1/calculator", post(calculator))
        // ── Watchlist & session ─────────────────────────────────────
        .route("/api/v1/watchlist", get(watchlist))
        .route("/api/v1/watchlist/:id/toggle", post(toggle_favorite))
        .route("/api/v1/session", post(start_session).delete(end_session))
        // ── WebSocket ───────────────────────────────────────────────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// =============================================================================
// Market table
// =============================================================================

async fn markets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn reload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let outcome = state.reload().await;
    info!(?outcome, "market reload via API");
    Json(json!({
        "outcome": outcome,
        "market": state.market_page(),
    }))
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    text: String,
}

async fn set_search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    state.set_search(&req.text);
    debug!(text = %req.text, "search text updated");
    Json(state.market_page())
}

#[derive(Deserialize)]
struct FavoritesOnlyRequest {
    enabled: bool,
}

async fn set_favorites_only(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FavoritesOnlyRequest>,
) -> impl IntoResponse {
    state.set_favorites_only(req.enabled);
    Json(state.market_page())
}

#[derive(Deserialize)]
struct SortRequest {
    key: SortKey,
}

async fn toggle_sort(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SortRequest>,
) -> impl IntoResponse {
    state.toggle_sort(req.key);
    Json(state.market_page())
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum StepWire {
    Next,
    Prev,
}

#[derive(Deserialize)]
struct PageRequest {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    step: Option<StepWire>,
}

async fn set_page(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match (req.page, req.step) {
        (Some(page), None) => {
            state.set_page(page);
        }
        (None, Some(StepWire::Next)) => {
            state.step_page(PageStep::Next);
        }
        (None, Some(StepWire::Prev)) => {
            state.step_page(PageStep::Prev);
        }
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Provide exactly one of 'page' or 'step'",
            ));
        }
    }
    Ok(Json(state.market_page()))
}

// =============================================================================
// Detail
// =============================================================================

#[derive(Deserialize)]
struct IndicatorQuery {
    #[serde(default)]
    sma: Option<usize>,
    #[serde(default)]
    ema: Option<usize>,
}

async fn coin_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<IndicatorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    match state.coin_view(&id, query.sma, query.ema).await {
        Ok(view) => Ok(Json(view)),
        Err(e) => {
            let status = match &e {
                ProviderError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ProviderError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            };
            warn!(id = %id, error = %e, status = status.as_u16(), "coin detail failed");
            Err(api_error(status, e.to_string()))
        }
    }
}

#[derive(Deserialize)]
struct CalculatorRequest {
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    investment: Option<AmountInput>,
    #[serde(default)]
    buy_price: Option<AmountInput>,
    #[serde(default)]
    sell_price: Option<AmountInput>,
}

/// Missing fields fall back to the seeded scenario for `current_price`.
async fn calculator(Json(req): Json<CalculatorRequest>) -> impl IntoResponse {
    let current = req.current_price.unwrap_or(0.0);
    let scenario = ProfitScenario {
        investment: req
            .investment
            .map(|v| v.value())
            .unwrap_or(DEFAULT_INVESTMENT),
        buy_price: req.buy_price.map(|v| v.value()).unwrap_or(current),
        sell_price: req
            .sell_price
            .map(|v| v.value())
            .unwrap_or(current * DEFAULT_TARGET_MULTIPLIER),
    };

    Json(json!({
        "scenario": scenario,
        "result": scenario.evaluate(),
    }))
}

// =============================================================================
// Watchlist & session
// =============================================================================

async fn watchlist(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "ids": state.watchlist.favorites().ids(),
        "session_user": state.watchlist.identity().map(|who| who.user_id),
        "remote_sync_failures": state.watchlist.remote_failures(),
    }))
}

#[derive(Serialize)]
struct ToggleResponse {
    asset_id: String,
    is_favorite: bool,
    remote_pending: bool,
}

async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let receipt = state.toggle_favorite(&id);
    let remote_pending = receipt.remote.is_some();

    // Bump the version once the remote leg settles so pushed snapshots pick
    // up the failure counter.
    if let Some(completion) = receipt.remote {
        let state = state.clone();
        tokio::spawn(async move {
            let _ = completion.wait().await;
            state.increment_version();
        });
    }

    Json(ToggleResponse {
        asset_id: receipt.asset_id,
        is_favorite: receipt.is_favorite,
        remote_pending,
    })
}

#[derive(Deserialize)]
struct SessionRequest {
    user_id: String,
    access_token: String,
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let who = RemoteIdentity::parse(&req.user_id, req.access_token).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid user id: '{}'. Expected a UUID.", req.user_id),
        )
    })?;

    let load = state.start_session(who).await;
    info!(?load, "session started via API");
    Ok(Json(json!({
        "load": load,
        "ids": state.watchlist.favorites().ids(),
    })))
}

async fn end_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.end_session();
    StatusCode::NO_CONTENT
}

// =============================================================================
// Tests
// =============================================================================

//! HTTP route definitions

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::game::{ErrorKind, GameError};
use crate::http::middleware::limit_new_games;
use crate::http::protocol::{
    GameListResponse, JoinQuery, LeaveQuery, LeaveResponse, Snapshot, UpdateQuery,
};
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let creation_routes = Router::new()
        .route("/newgame", get(new_game_handler))
        .layer(middleware::from_fn_with_state(state.clone(), limit_new_games));

    let game_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/games", get(list_games_handler))
        .route("/join", get(join_handler))
        .route("/update", get(update_handler))
        .route("/leave", get(leave_handler));

    Router::new()
        .merge(creation_routes)
        .merge(game_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_games: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_games: state.registry.active_games(),
        active_players: state.registry.total_players(),
    })
}

// ============================================================================
// Game endpoints
// ============================================================================

async fn list_games_handler(State(state): State<AppState>) -> Json<GameListResponse> {
    Json(GameListResponse {
        games: state.registry.list_games(),
    })
}

async fn new_game_handler(
    State(state): State<AppState>,
    Query(query): Query<JoinQuery>,
) -> Result<Json<Snapshot>, AppError> {
    validate_names(&query)?;
    let snapshot = state
        .registry
        .new_game(&query.game, &query.user, query.viewport())
        .await?;
    Ok(Json(snapshot))
}

async fn join_handler(
    State(state): State<AppState>,
    Query(query): Query<JoinQuery>,
) -> Result<Json<Snapshot>, AppError> {
    validate_names(&query)?;
    let snapshot = state
        .registry
        .join(&query.game, &query.user, query.viewport())
        .await?;
    Ok(Json(snapshot))
}

/// Long poll: held open until the player has a snapshot it has not seen
async fn update_handler(
    State(state): State<AppState>,
    Query(query): Query<UpdateQuery>,
) -> Result<Json<Snapshot>, AppError> {
    let snapshot = state
        .registry
        .request_update(&query.user, query.input())
        .await?;
    Ok(Json(snapshot))
}

async fn leave_handler(
    State(state): State<AppState>,
    Query(query): Query<LeaveQuery>,
) -> Result<Json<LeaveResponse>, AppError> {
    state.registry.leave(&query.user).await?;
    Ok(Json(LeaveResponse { status: "left" }))
}

fn validate_names(query: &JoinQuery) -> Result<(), AppError> {
    if query.game.trim().is_empty() {
        return Err(AppError::BadRequest("game name must not be empty".to_string()));
    }
    if query.user.trim().is_empty() {
        return Err(AppError::BadRequest("user name must not be empty".to_string()));
    }
    Ok(())
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GameError> for AppError {
    fn from(err: GameError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::AlreadyExists => AppError::Conflict(message),
            ErrorKind::InvalidState => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

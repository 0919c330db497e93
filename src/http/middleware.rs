//! Request throttling middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::app::AppState;

use super::routes::AppError;

/// Reject game creation beyond the configured rate.
///
/// Each new game generates a full maze and spawns an actor, so this route
/// is throttled globally rather than per client.
pub async fn limit_new_games(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.new_game_limiter.check().is_err() {
        warn!(path = %request.uri().path(), "New game rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}

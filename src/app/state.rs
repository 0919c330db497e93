//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::GameRegistry;
use crate::util::rate_limit::{create_limiter, Limiter};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<GameRegistry>,
    /// Caps how fast new games (and their mazes) are generated
    pub new_game_limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let registry = Arc::new(GameRegistry::new(config.game.clone()));
        let new_game_limiter = create_limiter(config.new_game_rate_limit);

        Self {
            config,
            registry,
            new_game_limiter,
        }
    }
}

//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Largest maze side, in cells
pub const MAX_MAZE_SIDE: u32 = 256;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
    /// Max new games created per second across all clients
    pub new_game_rate_limit: u32,

    /// Simulation rules shared by every game
    pub game: GameConfig,
}

/// Simulation constants applied to every match
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Fixed period between ticks
    pub tick_period: Duration,
    /// Ticks a dead player waits before reviving
    pub respawn_delay: u32,
    /// Bullet sub-steps per tick
    pub bullet_speed: u32,
    /// Chance that an enemy attempts a step each tick
    pub enemy_move_probability: f64,
    /// Per-tick spawn chance of a freshly placed generator
    pub default_generator_probability: f64,
    /// Generators placed when a match is created
    pub generators_per_game: usize,
    /// Maze width in cells
    pub maze_width: u32,
    /// Maze height in cells
    pub maze_height: u32,
    /// Toroidal edges for walls, movement and rendering
    pub wrap_enabled: bool,
    pub diagonal_bullets_bounce: bool,
    pub bullets_kill_players: bool,
    pub bullets_kill_generators: bool,
    /// Players silent for longer than this are removed (zero disables)
    pub player_idle_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(200),
            respawn_delay: 20,
            bullet_speed: 2,
            enemy_move_probability: 0.5,
            default_generator_probability: 0.02,
            generators_per_game: 8,
            maze_width: 32,
            maze_height: 32,
            wrap_enabled: true,
            diagonal_bullets_bounce: true,
            bullets_kill_players: true,
            bullets_kill_generators: true,
            player_idle_timeout: Duration::from_secs(120),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            new_game_rate_limit: env_or("NEW_GAME_RATE_LIMIT", 2)?,

            game: GameConfig::from_env()?,
        })
    }
}

impl GameConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            tick_period: Duration::from_millis(env_or(
                "TICK_PERIOD_MS",
                defaults.tick_period.as_millis() as u64,
            )?),
            respawn_delay: env_or("RESPAWN_DELAY_TICKS", defaults.respawn_delay)?,
            bullet_speed: env_or("BULLET_SPEED", defaults.bullet_speed)?,
            enemy_move_probability: env_or(
                "ENEMY_MOVE_PROBABILITY",
                defaults.enemy_move_probability,
            )?,
            default_generator_probability: env_or(
                "GENERATOR_PROBABILITY",
                defaults.default_generator_probability,
            )?,
            generators_per_game: env_or("GENERATORS_PER_GAME", defaults.generators_per_game)?,
            maze_width: env_or("MAZE_WIDTH", defaults.maze_width)?,
            maze_height: env_or("MAZE_HEIGHT", defaults.maze_height)?,
            wrap_enabled: env_or("WRAP_ENABLED", defaults.wrap_enabled)?,
            diagonal_bullets_bounce: env_or(
                "DIAGONAL_BULLETS_BOUNCE",
                defaults.diagonal_bullets_bounce,
            )?,
            bullets_kill_players: env_or("BULLETS_KILL_PLAYERS", defaults.bullets_kill_players)?,
            bullets_kill_generators: env_or(
                "BULLETS_KILL_GENERATORS",
                defaults.bullets_kill_generators,
            )?,
            player_idle_timeout: Duration::from_secs(env_or(
                "PLAYER_IDLE_TIMEOUT_SECS",
                defaults.player_idle_timeout.as_secs(),
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period.is_zero() {
            return Err(ConfigError::Invalid("TICK_PERIOD_MS"));
        }
        if !(1..=MAX_MAZE_SIDE).contains(&self.maze_width) {
            return Err(ConfigError::Invalid("MAZE_WIDTH"));
        }
        if !(1..=MAX_MAZE_SIDE).contains(&self.maze_height) {
            return Err(ConfigError::Invalid("MAZE_HEIGHT"));
        }
        if !(0.0..=1.0).contains(&self.enemy_move_probability) {
            return Err(ConfigError::Invalid("ENEMY_MOVE_PROBABILITY"));
        }
        if !(0.0..=1.0).contains(&self.default_generator_probability) {
            return Err(ConfigError::Invalid("GENERATOR_PROBABILITY"));
        }
        Ok(())
    }
}

/// Parse an optional environment variable, keeping `default` when unset
fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

//! Game simulation modules

pub mod error;
pub mod maze;
pub mod r#match;
pub mod occupancy;
pub mod pending;
pub mod snapshot;
pub mod state;
pub mod tick;
pub mod world;

pub use error::{ErrorKind, GameError};
pub use r#match::GameRegistry;

/// Size of a single tile in pixels
pub const TILE_SIZE: i32 = 8;

/// Size of a maze cell, in tiles
pub const CELL_SIZE: u32 = 20;

/// Viewport assumed when a client does not report one
pub const DEFAULT_VIEWPORT: u32 = 400;

/// Largest viewport side rendered, in pixels
pub const MAX_VIEWPORT: u32 = 4096;

/// A unit move in {-1, 0, 1}²
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Step {
    pub dx: i32,
    pub dy: i32,
}

impl Step {
    /// Clamp each axis to the unit range
    pub fn new(dx: i32, dy: i32) -> Self {
        Self {
            dx: dx.signum(),
            dy: dy.signum(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    pub fn is_diagonal(&self) -> bool {
        self.dx != 0 && self.dy != 0
    }
}

/// Input carried by an update request
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerInput {
    /// New held movement direction, if the client reported one
    pub move_step: Option<Step>,
    /// Fire a bullet in this direction on the next tick
    pub fire: Option<Step>,
}

/// Client canvas size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Keep each side within 1..=MAX_VIEWPORT
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.clamp(1, MAX_VIEWPORT),
            height: self.height.clamp(1, MAX_VIEWPORT),
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIEWPORT,
            height: DEFAULT_VIEWPORT,
        }
    }
}

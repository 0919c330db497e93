//! HTTP wire types
//! Query parameters accepted by the long-poll endpoints and the JSON they return

use serde::{Deserialize, Serialize};

use crate::game::{PlayerInput, Step, Viewport, DEFAULT_VIEWPORT};

/// A drawable element in viewport pixel coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Primitive {
    /// Filled rectangle (walls)
    Rectangle {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        color: &'static str,
    },

    /// Filled circle centred on (x, y): players, enemies and bullets
    Circle {
        x: i32,
        y: i32,
        radius: i32,
        color: &'static str,
    },

    /// Outlined square (generators)
    HollowBox {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        color: &'static str,
    },
}

/// Everything one player sees after a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Tick the scene was rendered at
    pub tick: u64,
    /// Ticks left before the player revives, 0 while alive
    pub dead_ticks: u32,
    pub elements: Vec<Primitive>,
}

/// One entry of the game list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSummary {
    pub name: String,
    /// Player names, in no particular order
    pub players: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GameListResponse {
    pub games: Vec<GameSummary>,
}

/// `/newgame` and `/join`
#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    pub game: String,
    pub user: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl JoinQuery {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width.filter(|w| *w > 0).unwrap_or(DEFAULT_VIEWPORT),
            height: self.height.filter(|h| *h > 0).unwrap_or(DEFAULT_VIEWPORT),
        }
    }
}

/// `/update`: optional move vector (dx, dy) and fire vector (fx, fy)
#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    pub user: String,
    pub dx: Option<i32>,
    pub dy: Option<i32>,
    pub fx: Option<i32>,
    pub fy: Option<i32>,
}

impl UpdateQuery {
    /// A vector is only reported when at least one of its axes is present
    pub fn input(&self) -> PlayerInput {
        let vector = |x: Option<i32>, y: Option<i32>| {
            (x.is_some() || y.is_some()).then(|| Step::new(x.unwrap_or(0), y.unwrap_or(0)))
        };
        PlayerInput {
            move_step: vector(self.dx, self.dy),
            fire: vector(self.fx, self.fy).filter(|step| !step.is_zero()),
        }
    }
}

/// `/leave`
#[derive(Debug, Deserialize)]
pub struct LeaveQuery {
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_tagged_by_type() {
        let json = serde_json::to_value(Primitive::HollowBox {
            x: 1,
            y: 2,
            width: 14,
            height: 14,
            color: "#ffffff",
        })
        .unwrap();
        assert_eq!(json["type"], "hollow_box");
        assert_eq!(json["width"], 14);
    }

    #[test]
    fn update_query_keeps_absent_vectors_absent() {
        let query = UpdateQuery {
            user: "ann".into(),
            ..Default::default()
        };
        let input = query.input();
        assert!(input.move_step.is_none());
        assert!(input.fire.is_none());
    }

    #[test]
    fn update_query_clamps_vectors() {
        let query = UpdateQuery {
            user: "ann".into(),
            dx: Some(5),
            fy: Some(-3),
            ..Default::default()
        };
        let input = query.input();
        assert_eq!(input.move_step, Some(Step::new(1, 0)));
        assert_eq!(input.fire, Some(Step::new(0, -1)));
    }

    #[test]
    fn missing_viewport_falls_back_to_default() {
        let query = JoinQuery {
            game: "arena1".into(),
            user: "ann".into(),
            width: Some(640),
            height: None,
        };
        assert_eq!(
            query.viewport(),
            Viewport {
                width: 640,
                height: DEFAULT_VIEWPORT
            }
        );
    }
}

//! Viewport rendering of world state

use crate::http::protocol::{Primitive, Snapshot};

use super::world::{ObjectId, ObjectKind, World};
use super::{CELL_SIZE, MAX_VIEWPORT, TILE_SIZE};

const WALL_COLOR: &str = "#ffffff";
const BULLET_COLOR: &str = "#ffffff";
const SELF_COLOR: &str = "#33ff33";
const OTHER_USER_COLOR: &str = "#11dd11";
const ENEMY_COLOR: &str = "#ff3333";
const GENERATOR_COLORS: [&str; 7] = [
    "#ffffff", "#ff0000", "#00ff00", "#2222ff", "#ff00ff", "#00ffff", "#ffff00",
];

/// Builds the drawable scene seen by one player
pub struct SnapshotBuilder<'a> {
    world: &'a World,
    tick: u64,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(world: &'a World, tick: u64) -> Self {
        Self { world, tick }
    }

    /// Render the viewport centred on `viewer`.
    ///
    /// Coordinates are pixels relative to the viewport's top-left corner.
    /// Cells past the grid edge repeat when the maze wraps and are skipped
    /// otherwise, apart from the closing boundary walls.
    pub fn build(&self, viewer: ObjectId) -> Option<Snapshot> {
        let object = self.world.get(viewer)?;
        let user = self.world.user(viewer)?;
        let maze = self.world.maze();
        let cell = CELL_SIZE as i32;

        let width = user.viewport_width.min(MAX_VIEWPORT) as i32;
        let height = user.viewport_height.min(MAX_VIEWPORT) as i32;
        let ux = object.x() as i32;
        let uy = object.y() as i32;

        // viewport size in tiles and cells, rounded up
        let tile_width = width.saturating_add(TILE_SIZE - 1) / TILE_SIZE;
        let tile_height = height.saturating_add(TILE_SIZE - 1) / TILE_SIZE;
        let cell_width = tile_width.saturating_add(cell - 1) / cell;
        let cell_height = tile_height.saturating_add(cell - 1) / cell;

        let min_cell_x = (ux - (tile_width + 1) / 2).div_euclid(cell);
        let min_cell_y = (uy - (tile_height + 1) / 2).div_euclid(cell);

        let grid_w = maze.width() as i32;
        let grid_h = maze.height() as i32;
        let mut elements = Vec::new();

        for ucx in min_cell_x..=min_cell_x + cell_width {
            for ucy in min_cell_y..=min_cell_y + cell_height {
                let px = (ucx * cell - ux) * TILE_SIZE + width / 2 - TILE_SIZE / 2;
                let py = (ucy * cell - uy) * TILE_SIZE + height / 2 - TILE_SIZE / 2;

                let (cx, cy) = if maze.wraps() {
                    (ucx.rem_euclid(grid_w), ucy.rem_euclid(grid_h))
                } else {
                    if ucx < 0 || ucy < 0 {
                        continue;
                    }
                    // closing walls along the right and bottom edges
                    if ucx == grid_w && ucy < grid_h {
                        elements.push(wall(px, py, TILE_SIZE, TILE_SIZE * cell));
                    }
                    if ucy == grid_h && ucx < grid_w {
                        elements.push(wall(px, py, TILE_SIZE * cell, TILE_SIZE));
                    }
                    if ucx >= grid_w || ucy >= grid_h {
                        continue;
                    }
                    (ucx, ucy)
                };
                let (cx, cy) = (cx as u32, cy as u32);

                if maze.v_wall(cx, cy) {
                    elements.push(wall(px, py, TILE_SIZE, TILE_SIZE * cell));
                }
                if maze.h_wall(cx, cy) {
                    elements.push(wall(px, py, TILE_SIZE * cell, TILE_SIZE));
                }

                let origin_x = (cx * CELL_SIZE) as i32;
                let origin_y = (cy * CELL_SIZE) as i32;
                let place = |id: &ObjectId| {
                    self.world.get(*id).map(|o| {
                        (
                            px + (o.x() as i32 - origin_x) * TILE_SIZE + TILE_SIZE / 2,
                            py + (o.y() as i32 - origin_y) * TILE_SIZE + TILE_SIZE / 2,
                        )
                    })
                };

                for id in self.world.cell_objects(cx, cy, ObjectKind::Bullet) {
                    if let Some((x, y)) = place(id) {
                        elements.push(circle(x, y, BULLET_COLOR));
                    }
                }
                for id in self.world.cell_objects(cx, cy, ObjectKind::User) {
                    if let Some((x, y)) = place(id) {
                        let color = if *id == viewer { SELF_COLOR } else { OTHER_USER_COLOR };
                        elements.push(circle(x, y, color));
                    }
                }
                for id in self.world.cell_objects(cx, cy, ObjectKind::Enemy) {
                    if let Some((x, y)) = place(id) {
                        elements.push(circle(x, y, ENEMY_COLOR));
                    }
                }
                if let Some((_, generator)) = self.world.cell_generator(cx, cy) {
                    let gx = px + (generator.x as i32 - origin_x) * TILE_SIZE + TILE_SIZE;
                    let gy = py + (generator.y as i32 - origin_y) * TILE_SIZE + TILE_SIZE;
                    let color = GENERATOR_COLORS[(self.tick % GENERATOR_COLORS.len() as u64) as usize];
                    elements.push(Primitive::HollowBox {
                        x: gx - TILE_SIZE * 7 / 8,
                        y: gy - TILE_SIZE * 7 / 8,
                        width: TILE_SIZE * 7 / 4,
                        height: TILE_SIZE * 7 / 4,
                        color,
                    });
                }
            }
        }

        Some(Snapshot {
            tick: self.tick,
            dead_ticks: user.dead_count,
            elements,
        })
    }
}

fn wall(x: i32, y: i32, width: i32, height: i32) -> Primitive {
    Primitive::Rectangle {
        x,
        y,
        width,
        height,
        color: WALL_COLOR,
    }
}

fn circle(x: i32, y: i32, color: &'static str) -> Primitive {
    Primitive::Circle {
        x,
        y,
        radius: TILE_SIZE * 3 / 8,
        color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::maze::Maze;
    use crate::game::world::{Body, UserState};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tokio::time::Instant;

    fn viewer(world: &mut World, x: u32, y: u32) -> ObjectId {
        let state = UserState::new("viewer".into(), 400, 400, Instant::now());
        world.spawn(x, y, Body::User(Box::new(state)))
    }

    #[test]
    fn viewer_is_drawn_at_viewport_centre() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut world = World::new(Maze::generate(8, 8, true, &mut rng).unwrap());
        let id = viewer(&mut world, 45, 45);

        let snapshot = SnapshotBuilder::new(&world, 3).build(id).unwrap();
        assert_eq!(snapshot.tick, 3);
        assert!(snapshot.elements.iter().any(|e| matches!(
            e,
            Primitive::Circle { x: 200, y: 200, color, .. } if *color == SELF_COLOR
        )));
    }

    #[test]
    fn nearby_enemy_is_offset_by_tiles() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut world = World::new(Maze::generate(8, 8, false, &mut rng).unwrap());
        let id = viewer(&mut world, 45, 45);
        world.spawn_enemy(47, 44);

        let snapshot = SnapshotBuilder::new(&world, 0).build(id).unwrap();
        let enemies: Vec<_> = snapshot
            .elements
            .iter()
            .filter_map(|e| match e {
                Primitive::Circle { x, y, color, .. } if *color == ENEMY_COLOR => Some((*x, *y)),
                _ => None,
            })
            .collect();
        assert_eq!(enemies, vec![(200 + 2 * TILE_SIZE, 200 - TILE_SIZE)]);
    }

    #[test]
    fn walls_are_rendered() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut world = World::new(Maze::generate(8, 8, false, &mut rng).unwrap());
        let id = viewer(&mut world, 5, 5);

        let snapshot = SnapshotBuilder::new(&world, 0).build(id).unwrap();
        assert!(snapshot
            .elements
            .iter()
            .any(|e| matches!(e, Primitive::Rectangle { .. })));
    }

    #[test]
    fn oversized_viewport_renders_a_bounded_scene() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut world = World::new(Maze::generate(8, 8, true, &mut rng).unwrap());
        let state = UserState::new("wide".into(), u32::MAX, i32::MAX as u32, Instant::now());
        let id = world.spawn(45, 45, Body::User(Box::new(state)));

        let snapshot = SnapshotBuilder::new(&world, 0).build(id).unwrap();
        let centre = MAX_VIEWPORT as i32 / 2;
        assert!(snapshot.elements.iter().any(|e| matches!(
            e,
            Primitive::Circle { x, y, color, .. }
                if *x == centre && *y == centre && *color == SELF_COLOR
        )));
    }

    #[test]
    fn unknown_viewer_renders_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut world = World::new(Maze::generate(2, 2, false, &mut rng).unwrap());
        let enemy = world.spawn_enemy(5, 5);
        assert!(SnapshotBuilder::new(&world, 0).build(enemy).is_none());
    }
}

//! Tile occupancy resolution

use super::world::{GeneratorId, ObjectId, ObjectKind, World};

/// What a tile holds, resolved with a fixed precedence:
/// wall, then user, generator, bullet, enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupant {
    Empty,
    Wall,
    User(ObjectId),
    Generator(GeneratorId),
    Bullet(ObjectId),
    Enemy(ObjectId),
}

impl Occupant {
    pub fn is_empty(&self) -> bool {
        matches!(self, Occupant::Empty)
    }
}

impl World {
    /// Resolve a tile given in signed coordinates.
    ///
    /// Off-grid tiles wrap when the maze wraps and are walls otherwise.
    pub fn occupancy(&self, x: i64, y: i64) -> Occupant {
        match self.normalize(x, y) {
            Some((x, y)) => self.occupancy_at(x, y),
            None => Occupant::Wall,
        }
    }

    /// Resolve an on-grid tile
    pub fn occupancy_at(&self, x: u32, y: u32) -> Occupant {
        if self.maze().is_wall_tile(x, y) {
            return Occupant::Wall;
        }

        let cx = x / super::CELL_SIZE;
        let cy = y / super::CELL_SIZE;
        let at = |id: &&ObjectId| {
            self.get(**id)
                .map(|object| object.x() == x && object.y() == y)
                .unwrap_or(false)
        };

        if let Some(id) = self.cell_objects(cx, cy, ObjectKind::User).iter().find(at) {
            return Occupant::User(*id);
        }
        if let Some((id, generator)) = self.cell_generator(cx, cy) {
            if generator.covers(x, y) {
                return Occupant::Generator(id);
            }
        }
        if let Some(id) = self.cell_objects(cx, cy, ObjectKind::Bullet).iter().find(at) {
            return Occupant::Bullet(*id);
        }
        if let Some(id) = self.cell_objects(cx, cy, ObjectKind::Enemy).iter().find(at) {
            return Occupant::Enemy(*id);
        }
        Occupant::Empty
    }

    /// Resolve the tile one step away from (x, y)
    pub fn occupancy_toward(&self, x: u32, y: u32, step: super::Step) -> (Option<(u32, u32)>, Occupant) {
        match self.step_target(x, y, step) {
            Some((tx, ty)) => (Some((tx, ty)), self.occupancy_at(tx, ty)),
            None => (None, Occupant::Wall),
        }
    }

    /// Pick a random empty tile, giving up after a bounded number of draws
    pub fn random_empty_tile<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Option<(u32, u32)> {
        const ATTEMPTS: usize = 10_000;
        let w = self.maze().tile_width() as u32;
        let h = self.maze().tile_height() as u32;
        (0..ATTEMPTS)
            .map(|_| (rng.gen_range(0..w), rng.gen_range(0..h)))
            .find(|(x, y)| self.occupancy_at(*x, *y).is_empty())
    }
}

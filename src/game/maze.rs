//! Perfect maze generation (randomized Kruskal over cell walls)

use rand::seq::SliceRandom;
use rand::Rng;

use super::error::GameError;
use super::CELL_SIZE;

/// Which side of a cell a wall sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// Left edge of the cell (a vertical wall)
    Left,
    /// Top edge of the cell (a horizontal wall)
    Top,
}

/// A wall that may be knocked down to join two cells
#[derive(Debug, Clone, Copy)]
struct Candidate {
    side: Side,
    x: u32,
    y: u32,
}

/// Wall bitmaps for a grid of cells. Never mutated after generation.
#[derive(Debug, Clone)]
pub struct Maze {
    width: u32,
    height: u32,
    wrap: bool,
    /// `v_walls[x + y * width]`: wall on the left edge of cell (x, y)
    v_walls: Vec<bool>,
    /// `h_walls[x + y * width]`: wall on the top edge of cell (x, y)
    h_walls: Vec<bool>,
}

impl Maze {
    /// Carve a spanning tree over a `width` x `height` grid.
    ///
    /// Every wall starts standing. Candidate walls are shuffled and visited in
    /// order; a wall is removed only when the two cells it separates are in
    /// different components, so the open passages form exactly one tree.
    /// Boundary walls are only candidates when `wrap` joins opposite edges.
    pub fn generate<R: Rng + ?Sized>(
        width: u32,
        height: u32,
        wrap: bool,
        rng: &mut R,
    ) -> Result<Self, GameError> {
        if width == 0 || height == 0 {
            return Err(GameError::InvalidState(format!(
                "cannot build a {}x{} maze",
                width, height
            )));
        }

        let cells = (width * height) as usize;
        let mut maze = Self {
            width,
            height,
            wrap,
            v_walls: vec![true; cells],
            h_walls: vec![true; cells],
        };

        let mut candidates = Vec::with_capacity(cells * 2);
        for y in 0..height {
            for x in 0..width {
                if x > 0 || (wrap && width > 1) {
                    candidates.push(Candidate { side: Side::Left, x, y });
                }
                if y > 0 || (wrap && height > 1) {
                    candidates.push(Candidate { side: Side::Top, x, y });
                }
            }
        }
        candidates.shuffle(rng);

        let mut sets = DisjointSets::new(cells);
        let mut removed = 0usize;

        while let Some(candidate) = candidates.pop() {
            if removed == cells - 1 {
                break;
            }
            let (a, b) = maze.separated_cells(candidate);
            if sets.same_set(a, b) {
                // Joining two cells of one component would close a loop
                continue;
            }
            sets.union(a, b)?;
            maze.knock_down(candidate);
            removed += 1;
        }

        if removed != cells - 1 {
            return Err(GameError::InvalidState(format!(
                "maze carved {} passages for {} cells",
                removed, cells
            )));
        }

        Ok(maze)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn wraps(&self) -> bool {
        self.wrap
    }

    /// Width of the maze in tiles
    pub fn tile_width(&self) -> i32 {
        (self.width * CELL_SIZE) as i32
    }

    /// Height of the maze in tiles
    pub fn tile_height(&self) -> i32 {
        (self.height * CELL_SIZE) as i32
    }

    /// Wall on the left edge of cell (x, y)
    pub fn v_wall(&self, x: u32, y: u32) -> bool {
        self.v_walls[(x + y * self.width) as usize]
    }

    /// Wall on the top edge of cell (x, y)
    pub fn h_wall(&self, x: u32, y: u32) -> bool {
        self.h_walls[(x + y * self.width) as usize]
    }

    /// Whether an in-bounds tile is covered by a wall.
    ///
    /// Walls run along the first tile row/column of each cell. The corner tile
    /// of a cell is a post whenever any of the four walls meeting there stands.
    pub fn is_wall_tile(&self, tx: u32, ty: u32) -> bool {
        let cx = tx / CELL_SIZE;
        let cy = ty / CELL_SIZE;
        let on_left = tx % CELL_SIZE == 0;
        let on_top = ty % CELL_SIZE == 0;

        match (on_left, on_top) {
            (false, false) => false,
            (true, false) => self.v_wall(cx, cy),
            (false, true) => self.h_wall(cx, cy),
            (true, true) => {
                if self.v_wall(cx, cy) || self.h_wall(cx, cy) {
                    return true;
                }
                let above = self.previous(cy, self.height).map(|py| self.v_wall(cx, py));
                let left = self.previous(cx, self.width).map(|px| self.h_wall(px, cy));
                above.unwrap_or(false) || left.unwrap_or(false)
            }
        }
    }

    /// Number of walls that are down, counting each shared edge once
    pub fn open_passages(&self) -> usize {
        self.v_walls
            .iter()
            .chain(self.h_walls.iter())
            .filter(|wall| !**wall)
            .count()
    }

    /// Cells reachable in one step from (x, y) through open walls
    pub fn open_neighbors(&self, x: u32, y: u32) -> Vec<(u32, u32)> {
        let mut out = Vec::with_capacity(4);
        let right = (x + 1) % self.width;
        let below = (y + 1) % self.height;

        if !self.v_wall(x, y) {
            if let Some(px) = self.previous(x, self.width) {
                out.push((px, y));
            }
        }
        if (x + 1 < self.width || self.wrap) && !self.v_wall(right, y) {
            out.push((right, y));
        }
        if !self.h_wall(x, y) {
            if let Some(py) = self.previous(y, self.height) {
                out.push((x, py));
            }
        }
        if (y + 1 < self.height || self.wrap) && !self.h_wall(x, below) {
            out.push((x, below));
        }
        out
    }

    /// Index one step back along an axis, wrapping when enabled
    fn previous(&self, v: u32, len: u32) -> Option<u32> {
        if v > 0 {
            Some(v - 1)
        } else if self.wrap {
            Some(len - 1)
        } else {
            None
        }
    }

    /// The two cell indexes a candidate wall separates
    fn separated_cells(&self, candidate: Candidate) -> (usize, usize) {
        let w = self.width;
        let h = self.height;
        let here = (candidate.x + candidate.y * w) as usize;
        let other = match candidate.side {
            Side::Left => {
                let px = if candidate.x == 0 { w - 1 } else { candidate.x - 1 };
                px + candidate.y * w
            }
            Side::Top => {
                let py = if candidate.y == 0 { h - 1 } else { candidate.y - 1 };
                candidate.x + py * w
            }
        };
        (here, other as usize)
    }

    fn knock_down(&mut self, candidate: Candidate) {
        let idx = (candidate.x + candidate.y * self.width) as usize;
        match candidate.side {
            Side::Left => self.v_walls[idx] = false,
            Side::Top => self.h_walls[idx] = false,
        }
    }
}

/// Array-backed union-find with path compression and union by rank
struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSets {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, item: usize) -> usize {
        let mut root = item;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = item;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn same_set(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    fn union(&mut self, a: usize, b: usize) -> Result<(), GameError> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return Err(GameError::InvalidState(format!(
                "cells {} and {} are already joined",
                a, b
            )));
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::{HashSet, VecDeque};

    fn reachable_cells(maze: &Maze) -> usize {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(0u32, 0u32)]);
        seen.insert((0, 0));
        while let Some((x, y)) = queue.pop_front() {
            for next in maze.open_neighbors(x, y) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.len()
    }

    #[test]
    fn non_wrapped_maze_is_a_spanning_tree() {
        for seed in 0..8 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let maze = Maze::generate(12, 9, false, &mut rng).unwrap();
            let cells = 12 * 9;
            assert_eq!(maze.open_passages(), cells - 1);
            assert_eq!(reachable_cells(&maze), cells);
        }
    }

    #[test]
    fn wrapped_maze_is_a_spanning_tree() {
        for seed in 0..8 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let maze = Maze::generate(32, 32, true, &mut rng).unwrap();
            assert_eq!(maze.open_passages(), 32 * 32 - 1);
            assert_eq!(reachable_cells(&maze), 32 * 32);
        }
    }

    #[test]
    fn non_wrapped_boundary_walls_stay_standing() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let maze = Maze::generate(6, 5, false, &mut rng).unwrap();
        for y in 0..5 {
            assert!(maze.v_wall(0, y));
        }
        for x in 0..6 {
            assert!(maze.h_wall(x, 0));
        }
    }

    #[test]
    fn single_cell_maze_keeps_every_wall() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let maze = Maze::generate(1, 1, true, &mut rng).unwrap();
        assert_eq!(maze.open_passages(), 0);
        assert!(maze.v_wall(0, 0) && maze.h_wall(0, 0));
    }

    #[test]
    fn zero_sized_maze_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = Maze::generate(0, 4, false, &mut rng).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn wall_tiles_follow_the_bitmaps() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let maze = Maze::generate(4, 4, false, &mut rng).unwrap();
        // Cell interiors are never walls
        assert!(!maze.is_wall_tile(5, 5));
        // Left edge of the grid is solid
        assert!(maze.is_wall_tile(0, 7));
        for cy in 0..4 {
            for cx in 0..4 {
                let tx = cx * CELL_SIZE;
                let ty = cy * CELL_SIZE + 3;
                assert_eq!(maze.is_wall_tile(tx, ty), maze.v_wall(cx, cy));
                assert_eq!(
                    maze.is_wall_tile(cx * CELL_SIZE + 3, cy * CELL_SIZE),
                    maze.h_wall(cx, cy)
                );
            }
        }
    }

    #[test]
    fn union_of_joined_cells_is_invalid_state() {
        let mut sets = DisjointSets::new(4);
        sets.union(0, 1).unwrap();
        sets.union(1, 2).unwrap();
        assert!(sets.same_set(0, 2));
        assert!(matches!(sets.union(2, 0), Err(GameError::InvalidState(_))));
    }
}

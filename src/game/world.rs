//! Authoritative world model.
//!
//! Objects live in one arena keyed by stable ids. Two secondary indexes sit
//! on top of it: a per-cell list for every object kind (occupancy queries
//! only scan the cell a tile falls in) and a per-kind set used for
//! game-wide iteration. `move_to`, `spawn` and `despawn` are the only
//! paths that touch coordinates or membership, which keeps the cell index
//! in step with every object's (x, y).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tokio::time::Instant;

use super::error::GameError;
use super::maze::Maze;
use super::{Step, CELL_SIZE};

/// Stable handle of a movable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable handle of a generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeneratorId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    User,
    Bullet,
    Enemy,
}

/// Player-specific state
#[derive(Debug, Clone)]
pub struct UserState {
    pub name: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Held movement direction, replaced by each input
    pub move_step: Step,
    /// One-shot fire request, consumed by the next tick
    pub fire_step: Option<Step>,
    /// 0 = alive, otherwise ticks left before reviving
    pub dead_count: u32,
    /// Tick whose state this player has already been sent
    pub last_served_tick: Option<u64>,
    pub last_seen: Instant,
}

impl UserState {
    pub fn new(name: String, viewport_width: u32, viewport_height: u32, now: Instant) -> Self {
        Self {
            name,
            viewport_width,
            viewport_height,
            move_step: Step::default(),
            fire_step: None,
            dead_count: 0,
            last_served_tick: None,
            last_seen: now,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.dead_count == 0
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    User(Box<UserState>),
    Bullet { velocity: Step },
    Enemy,
}

impl Body {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Body::User(_) => ObjectKind::User,
            Body::Bullet { .. } => ObjectKind::Bullet,
            Body::Enemy => ObjectKind::Enemy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    x: u32,
    y: u32,
    /// Whether the object is linked into its cell's list
    indexed: bool,
    pub body: Body,
}

impl Object {
    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn kind(&self) -> ObjectKind {
        self.body.kind()
    }
}

/// Static spawn point with a 2x2 tile footprint anchored at (x, y)
#[derive(Debug, Clone)]
pub struct Generator {
    pub x: u32,
    pub y: u32,
    pub probability: f64,
}

impl Generator {
    pub fn covers(&self, x: u32, y: u32) -> bool {
        (x == self.x || x == self.x + 1) && (y == self.y || y == self.y + 1)
    }
}

#[derive(Debug, Default, Clone)]
struct Cell {
    users: Vec<ObjectId>,
    bullets: Vec<ObjectId>,
    enemies: Vec<ObjectId>,
    generator: Option<GeneratorId>,
}

impl Cell {
    fn list(&self, kind: ObjectKind) -> &Vec<ObjectId> {
        match kind {
            ObjectKind::User => &self.users,
            ObjectKind::Bullet => &self.bullets,
            ObjectKind::Enemy => &self.enemies,
        }
    }

    fn list_mut(&mut self, kind: ObjectKind) -> &mut Vec<ObjectId> {
        match kind {
            ObjectKind::User => &mut self.users,
            ObjectKind::Bullet => &mut self.bullets,
            ObjectKind::Enemy => &mut self.enemies,
        }
    }
}

pub struct World {
    maze: Maze,
    objects: HashMap<ObjectId, Object>,
    cells: Vec<Cell>,
    users: BTreeSet<ObjectId>,
    bullets: BTreeSet<ObjectId>,
    enemies: BTreeSet<ObjectId>,
    names: HashMap<String, ObjectId>,
    generators: BTreeMap<GeneratorId, Generator>,
    next_id: u64,
}

impl World {
    pub fn new(maze: Maze) -> Self {
        let cells = (maze.width() * maze.height()) as usize;
        Self {
            maze,
            objects: HashMap::new(),
            cells: vec![Cell::default(); cells],
            users: BTreeSet::new(),
            bullets: BTreeSet::new(),
            enemies: BTreeSet::new(),
            names: HashMap::new(),
            generators: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    /// Map a possibly out-of-range tile onto the grid.
    ///
    /// Wrapping grids fold coordinates modulo the grid size; otherwise
    /// anything outside is `None`.
    pub fn normalize(&self, x: i64, y: i64) -> Option<(u32, u32)> {
        let w = self.maze.tile_width() as i64;
        let h = self.maze.tile_height() as i64;
        if self.maze.wraps() {
            Some((x.rem_euclid(w) as u32, y.rem_euclid(h) as u32))
        } else if (0..w).contains(&x) && (0..h).contains(&y) {
            Some((x as u32, y as u32))
        } else {
            None
        }
    }

    /// Tile one step away from (x, y)
    pub fn step_target(&self, x: u32, y: u32, step: Step) -> Option<(u32, u32)> {
        self.normalize(x as i64 + step.dx as i64, y as i64 + step.dy as i64)
    }

    fn cell_index(&self, x: u32, y: u32) -> usize {
        ((x / CELL_SIZE) + (y / CELL_SIZE) * self.maze.width()) as usize
    }

    fn kind_set(&self, kind: ObjectKind) -> &BTreeSet<ObjectId> {
        match kind {
            ObjectKind::User => &self.users,
            ObjectKind::Bullet => &self.bullets,
            ObjectKind::Enemy => &self.enemies,
        }
    }

    fn kind_set_mut(&mut self, kind: ObjectKind) -> &mut BTreeSet<ObjectId> {
        match kind {
            ObjectKind::User => &mut self.users,
            ObjectKind::Bullet => &mut self.bullets,
            ObjectKind::Enemy => &mut self.enemies,
        }
    }

    fn link(&mut self, id: ObjectId, kind: ObjectKind, x: u32, y: u32) {
        let idx = self.cell_index(x, y);
        self.cells[idx].list_mut(kind).push(id);
    }

    fn unlink(&mut self, id: ObjectId, kind: ObjectKind, x: u32, y: u32) {
        let idx = self.cell_index(x, y);
        let list = self.cells[idx].list_mut(kind);
        if let Some(pos) = list.iter().position(|other| *other == id) {
            list.swap_remove(pos);
        }
    }

    /// Insert a new object at an on-grid tile, linked into both indexes
    pub fn spawn(&mut self, x: u32, y: u32, body: Body) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;

        let kind = body.kind();
        if let Body::User(user) = &body {
            self.names.insert(user.name.clone(), id);
        }
        self.objects.insert(
            id,
            Object {
                x,
                y,
                indexed: true,
                body,
            },
        );
        self.kind_set_mut(kind).insert(id);
        self.link(id, kind, x, y);
        id
    }

    pub fn spawn_bullet(&mut self, x: u32, y: u32, velocity: Step) -> ObjectId {
        self.spawn(x, y, Body::Bullet { velocity })
    }

    pub fn spawn_enemy(&mut self, x: u32, y: u32) -> ObjectId {
        self.spawn(x, y, Body::Enemy)
    }

    /// Remove an object from the arena and both indexes
    pub fn despawn(&mut self, id: ObjectId) -> Option<Object> {
        let object = self.objects.remove(&id)?;
        let kind = object.kind();
        if object.indexed {
            self.unlink(id, kind, object.x, object.y);
        }
        self.kind_set_mut(kind).remove(&id);
        if let Body::User(user) = &object.body {
            self.names.remove(&user.name);
        }
        Some(object)
    }

    /// Move an object, keeping its cell membership in step with (x, y)
    pub fn move_to(&mut self, id: ObjectId, x: u32, y: u32) {
        let Some(object) = self.objects.get(&id) else {
            return;
        };
        let (old_x, old_y, kind, indexed) = (object.x, object.y, object.kind(), object.indexed);

        if indexed && self.cell_index(old_x, old_y) != self.cell_index(x, y) {
            self.unlink(id, kind, old_x, old_y);
            self.link(id, kind, x, y);
        }
        if let Some(object) = self.objects.get_mut(&id) {
            object.x = x;
            object.y = y;
        }
    }

    /// Drop an object from cell occupancy while keeping it in the game
    pub fn unindex(&mut self, id: ObjectId) {
        let Some(object) = self.objects.get_mut(&id) else {
            return;
        };
        if !object.indexed {
            return;
        }
        object.indexed = false;
        let (x, y, kind) = (object.x, object.y, object.kind());
        self.unlink(id, kind, x, y);
    }

    /// Link an unindexed object back into the cell at its position
    pub fn reindex(&mut self, id: ObjectId) {
        let Some(object) = self.objects.get_mut(&id) else {
            return;
        };
        if object.indexed {
            return;
        }
        object.indexed = true;
        let (x, y, kind) = (object.x, object.y, object.kind());
        self.link(id, kind, x, y);
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    pub fn user(&self, id: ObjectId) -> Option<&UserState> {
        match &self.objects.get(&id)?.body {
            Body::User(user) => Some(user.as_ref()),
            _ => None,
        }
    }

    pub fn user_mut(&mut self, id: ObjectId) -> Option<&mut UserState> {
        match &mut self.objects.get_mut(&id)?.body {
            Body::User(user) => Some(user.as_mut()),
            _ => None,
        }
    }

    pub fn user_id(&self, name: &str) -> Option<ObjectId> {
        self.names.get(name).copied()
    }

    /// Snapshot of the ids of one kind, safe to iterate while mutating
    pub fn ids(&self, kind: ObjectKind) -> Vec<ObjectId> {
        self.kind_set(kind).iter().copied().collect()
    }

    pub fn count(&self, kind: ObjectKind) -> usize {
        self.kind_set(kind).len()
    }

    pub fn user_names(&self) -> Vec<String> {
        self.users
            .iter()
            .filter_map(|id| self.user(*id))
            .map(|user| user.name.clone())
            .collect()
    }

    /// Objects of one kind linked into cell (cx, cy)
    pub fn cell_objects(&self, cx: u32, cy: u32, kind: ObjectKind) -> &[ObjectId] {
        let idx = (cx + cy * self.maze.width()) as usize;
        self.cells[idx].list(kind)
    }

    pub fn cell_generator(&self, cx: u32, cy: u32) -> Option<(GeneratorId, &Generator)> {
        let idx = (cx + cy * self.maze.width()) as usize;
        let id = self.cells[idx].generator?;
        self.generators.get(&id).map(|generator| (id, generator))
    }

    /// Place a generator whose whole footprint lies inside one cell.
    ///
    /// Fails when the footprint would straddle a cell boundary or the cell
    /// already owns a generator.
    pub fn add_generator(&mut self, x: u32, y: u32, probability: f64) -> Option<GeneratorId> {
        if x / CELL_SIZE != (x + 1) / CELL_SIZE || y / CELL_SIZE != (y + 1) / CELL_SIZE {
            return None;
        }
        if (x + 1) as i32 >= self.maze.tile_width() || (y + 1) as i32 >= self.maze.tile_height()
        {
            return None;
        }
        let idx = self.cell_index(x, y);
        if self.cells[idx].generator.is_some() {
            return None;
        }

        let id = GeneratorId(self.next_id);
        self.next_id += 1;
        self.generators.insert(id, Generator { x, y, probability });
        self.cells[idx].generator = Some(id);
        Some(id)
    }

    pub fn remove_generator(&mut self, id: GeneratorId) -> Option<Generator> {
        let generator = self.generators.remove(&id)?;
        let idx = self.cell_index(generator.x, generator.y);
        if self.cells[idx].generator == Some(id) {
            self.cells[idx].generator = None;
        }
        Some(generator)
    }

    pub fn generator(&self, id: GeneratorId) -> Option<&Generator> {
        self.generators.get(&id)
    }

    pub fn generator_ids(&self) -> Vec<GeneratorId> {
        self.generators.keys().copied().collect()
    }

    /// Verify that both indexes agree with the arena.
    ///
    /// Every indexed object must sit in exactly the cell list its (x, y)
    /// maps to; unindexed objects must sit in none.
    pub fn check_consistency(&self) -> Result<(), GameError> {
        let mut seen: HashMap<ObjectId, usize> = HashMap::new();
        for (idx, cell) in self.cells.iter().enumerate() {
            for kind in [ObjectKind::User, ObjectKind::Bullet, ObjectKind::Enemy] {
                for id in cell.list(kind) {
                    let object = self.objects.get(id).ok_or_else(|| {
                        GameError::InvalidState(format!("cell {} holds dead object {}", idx, id))
                    })?;
                    if object.kind() != kind || !object.indexed {
                        return Err(GameError::InvalidState(format!(
                            "object {} is listed under the wrong kind or while unindexed",
                            id
                        )));
                    }
                    if self.cell_index(object.x, object.y) != idx {
                        return Err(GameError::InvalidState(format!(
                            "object {} at ({}, {}) is linked into cell {}",
                            id, object.x, object.y, idx
                        )));
                    }
                    *seen.entry(*id).or_default() += 1;
                }
            }
        }

        for (id, object) in &self.objects {
            let expected = usize::from(object.indexed);
            let found = seen.get(id).copied().unwrap_or(0);
            if found != expected {
                return Err(GameError::InvalidState(format!(
                    "object {} is linked into {} cells",
                    id, found
                )));
            }
            if !self.kind_set(object.kind()).contains(id) {
                return Err(GameError::InvalidState(format!(
                    "object {} is missing from its kind list",
                    id
                )));
            }
        }

        let listed = self.users.len() + self.bullets.len() + self.enemies.len();
        if listed != self.objects.len() {
            return Err(GameError::InvalidState(format!(
                "kind lists hold {} ids for {} objects",
                listed,
                self.objects.len()
            )));
        }
        Ok(())
    }
}

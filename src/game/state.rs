//! Per-game state: world, clock and parked update requests

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::http::protocol::Snapshot;

use super::error::GameError;
use super::maze::Maze;
use super::pending::{PendingQueue, PendingUpdate, UpdateReply};
use super::snapshot::SnapshotBuilder;
use super::world::{Body, ObjectId, UserState, World};
use super::{PlayerInput, Viewport, CELL_SIZE};

/// Outcome of an update request
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The player had not seen the latest tick yet
    Ready(Snapshot),
    /// The player is caught up and must wait for the next tick
    Wait(ObjectId),
}

/// Summary of one completed tick
#[derive(Debug, Default)]
pub struct TickReport {
    pub tick: u64,
    /// Parked requests answered after the tick
    pub served: usize,
    /// Players removed for inactivity
    pub reaped: Vec<String>,
}

/// Authoritative state of one game (owned by its actor)
pub struct GameState {
    pub name: String,
    pub seed: u64,
    pub(super) config: GameConfig,
    pub(super) world: World,
    pub(super) rng: ChaCha8Rng,
    latest_tick: u64,
    pending: PendingQueue,
}

impl GameState {
    /// Generate the maze and place generators
    pub fn new(name: String, config: GameConfig, seed: u64) -> Result<Self, GameError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let maze = Maze::generate(config.maze_width, config.maze_height, config.wrap_enabled, &mut rng)?;

        let mut state = Self {
            name,
            seed,
            config,
            world: World::new(maze),
            rng,
            latest_tick: 0,
            pending: PendingQueue::new(),
        };
        state.place_generators();
        Ok(state)
    }

    /// Drop generators into distinct random cells, inside the cell interior
    fn place_generators(&mut self) {
        let cells = (self.config.maze_width * self.config.maze_height) as usize;
        let wanted = self.config.generators_per_game.min(cells);
        let mut placed = 0;
        let mut attempts = 0;

        while placed < wanted && attempts < wanted * 20 {
            attempts += 1;
            let cx = self.rng.gen_range(0..self.config.maze_width);
            let cy = self.rng.gen_range(0..self.config.maze_height);
            // keep the 2x2 footprint off the wall row/column and inside the cell
            let x = cx * CELL_SIZE + self.rng.gen_range(1..CELL_SIZE - 1);
            let y = cy * CELL_SIZE + self.rng.gen_range(1..CELL_SIZE - 1);
            if self
                .world
                .add_generator(x, y, self.config.default_generator_probability)
                .is_some()
            {
                placed += 1;
            }
        }

        debug!(game = %self.name, generators = placed, "Placed generators");
    }

    pub fn latest_tick(&self) -> u64 {
        self.latest_tick
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn player_names(&self) -> Vec<String> {
        self.world.user_names()
    }

    pub fn player_count(&self) -> usize {
        self.world.count(super::world::ObjectKind::User)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Place a new player on a random empty tile and render its first view
    pub fn join(
        &mut self,
        player: &str,
        viewport: Viewport,
        now: Instant,
    ) -> Result<Snapshot, GameError> {
        if self.world.user_id(player).is_some() {
            return Err(GameError::NameAlreadyInUse {
                name: player.to_string(),
                game: self.name.clone(),
            });
        }

        let (x, y) = self
            .world
            .random_empty_tile(&mut self.rng)
            .ok_or_else(|| GameError::InvalidState(format!("no free tile in {}", self.name)))?;

        let viewport = viewport.clamped();
        let mut user = UserState::new(player.to_string(), viewport.width, viewport.height, now);
        user.last_served_tick = Some(self.latest_tick);
        let id = self.world.spawn(x, y, Body::User(Box::new(user)));

        info!(game = %self.name, player = %player, x, y, "Player joined game");
        self.render(id)
    }

    /// Remove a player; any parked request of theirs fails with `PlayerNotFound`
    pub fn leave(&mut self, player: &str) -> Result<(), GameError> {
        let id = self
            .world
            .user_id(player)
            .ok_or_else(|| GameError::PlayerNotFound(player.to_string()))?;

        self.world.despawn(id);
        for update in self.pending.remove_for(id) {
            let _ = update
                .reply
                .send(Err(GameError::PlayerNotFound(update.player)));
        }

        info!(game = %self.name, player = %player, "Player left game");
        Ok(())
    }

    /// Apply input, then answer now or ask the caller to park.
    ///
    /// A player whose last snapshot is older than the latest tick is served
    /// immediately; a caught-up player waits for the next tick.
    pub fn request_update(
        &mut self,
        player: &str,
        input: PlayerInput,
        now: Instant,
    ) -> Result<UpdateOutcome, GameError> {
        let id = self
            .world
            .user_id(player)
            .ok_or_else(|| GameError::PlayerNotFound(player.to_string()))?;
        let latest = self.latest_tick;

        let user = self
            .world
            .user_mut(id)
            .ok_or_else(|| GameError::PlayerNotFound(player.to_string()))?;
        user.last_seen = now;
        if let Some(step) = input.move_step {
            user.move_step = step;
        }
        if let Some(fire) = input.fire.filter(|step| !step.is_zero()) {
            user.fire_step = Some(fire);
        }

        if user.last_served_tick == Some(latest) {
            return Ok(UpdateOutcome::Wait(id));
        }
        self.serve(id).map(UpdateOutcome::Ready)
    }

    /// Hold a caught-up request until the next tick completes
    pub fn park(&mut self, user: ObjectId, player: String, reply: UpdateReply) {
        let dropped = self.pending.prune_closed();
        if dropped > 0 {
            debug!(game = %self.name, dropped, "Discarded requests from disconnected clients");
        }
        self.pending.park(PendingUpdate {
            user,
            player,
            reply,
        });
    }

    /// Run one tick, advance the clock and release parked requests
    pub fn advance(&mut self, now: Instant) -> TickReport {
        self.run_tick();
        self.latest_tick += 1;

        let reaped = self.reap_idle(now);
        let served = self.flush_pending();

        TickReport {
            tick: self.latest_tick,
            served,
            reaped,
        }
    }

    /// Render a snapshot for `id` and mark it as served at the latest tick
    fn serve(&mut self, id: ObjectId) -> Result<Snapshot, GameError> {
        let snapshot = self.render(id)?;
        if let Some(user) = self.world.user_mut(id) {
            user.last_served_tick = Some(self.latest_tick);
        }
        Ok(snapshot)
    }

    fn render(&self, id: ObjectId) -> Result<Snapshot, GameError> {
        SnapshotBuilder::new(&self.world, self.latest_tick)
            .build(id)
            .ok_or_else(|| GameError::InvalidState(format!("object {} is not a player", id)))
    }

    /// Answer every parked request against the new state
    fn flush_pending(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let mut served = 0;
        for update in self.pending.drain() {
            if update.reply.is_closed() {
                continue;
            }
            let result = if self.world.user(update.user).is_some() {
                self.serve(update.user)
            } else {
                Err(GameError::PlayerNotFound(update.player.clone()))
            };
            if update.reply.send(result).is_ok() {
                served += 1;
            } else {
                debug!(game = %self.name, player = %update.player, "Dropped reply for closed request");
            }
        }
        served
    }

    /// Remove players that have not made a request within the idle timeout
    fn reap_idle(&mut self, now: Instant) -> Vec<String> {
        let timeout = self.config.player_idle_timeout;
        if timeout.is_zero() {
            return Vec::new();
        }

        let idle: Vec<String> = self
            .world
            .ids(super::world::ObjectKind::User)
            .into_iter()
            .filter_map(|id| self.world.user(id))
            .filter(|user| now.saturating_duration_since(user.last_seen) > timeout)
            .map(|user| user.name.clone())
            .collect();

        for name in &idle {
            if self.leave(name).is_ok() {
                info!(game = %self.name, player = %name, "Removed idle player");
            }
        }
        idle
    }
}

//! Game actors and the process-wide game registry

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::GameConfig;
use crate::http::protocol::{GameSummary, Snapshot};
use crate::util::time::Timer;

use super::error::GameError;
use super::pending::UpdateReply;
use super::state::{GameState, UpdateOutcome};
use super::{PlayerInput, Viewport};

/// Requests funnelled into a game actor
#[derive(Debug)]
pub enum GameCommand {
    Join {
        player: String,
        viewport: Viewport,
        reply: oneshot::Sender<Result<Snapshot, GameError>>,
    },
    /// Answered immediately or parked until the next tick
    Update {
        player: String,
        input: PlayerInput,
        reply: UpdateReply,
    },
    Leave {
        player: String,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
}

/// Handle for talking to a running game
#[derive(Clone)]
pub struct GameHandle {
    pub name: String,
    command_tx: mpsc::Sender<GameCommand>,
    player_count: Arc<AtomicUsize>,
}

impl GameHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    async fn send(&self, command: GameCommand) -> Result<(), GameError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| GameError::GameClosed(self.name.clone()))
    }

    async fn call<T>(
        &self,
        command: GameCommand,
        rx: oneshot::Receiver<Result<T, GameError>>,
    ) -> Result<T, GameError> {
        self.send(command).await?;
        rx.await
            .map_err(|_| GameError::GameClosed(self.name.clone()))?
    }

    pub async fn join(&self, player: &str, viewport: Viewport) -> Result<Snapshot, GameError> {
        let (reply, rx) = oneshot::channel();
        let command = GameCommand::Join {
            player: player.to_string(),
            viewport,
            reply,
        };
        self.call(command, rx).await
    }

    /// Resolves once a snapshot newer than the player's last one exists
    pub async fn request_update(
        &self,
        player: &str,
        input: PlayerInput,
    ) -> Result<Snapshot, GameError> {
        let (reply, rx) = oneshot::channel();
        let command = GameCommand::Update {
            player: player.to_string(),
            input,
            reply,
        };
        self.call(command, rx).await
    }

    pub async fn leave(&self, player: &str) -> Result<(), GameError> {
        let (reply, rx) = oneshot::channel();
        let command = GameCommand::Leave {
            player: player.to_string(),
            reply,
        };
        self.call(command, rx).await
    }
}

/// The actor owning one game's state
pub struct GameMatch {
    state: GameState,
    command_rx: mpsc::Receiver<GameCommand>,
    /// Global player name -> game name index, shared with the registry
    players: Arc<DashMap<String, String>>,
    player_count: Arc<AtomicUsize>,
}

impl GameMatch {
    /// Generate the game's maze and return the actor with its handle
    pub fn new(
        name: String,
        config: GameConfig,
        seed: u64,
        players: Arc<DashMap<String, String>>,
    ) -> Result<(Self, GameHandle), GameError> {
        let state = GameState::new(name.clone(), config, seed)?;
        let (command_tx, command_rx) = mpsc::channel(256);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = GameHandle {
            name,
            command_tx,
            player_count: player_count.clone(),
        };

        let game = Self {
            state,
            command_rx,
            players,
            player_count,
        };

        Ok((game, handle))
    }

    /// Run the tick loop, interleaving commands between ticks
    pub async fn run(mut self) {
        info!(game = %self.state.name, seed = self.state.seed, "Game started");

        let period = self.state.config.tick_period;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        info!(game = %self.state.name, "All handles dropped, stopping game");
                        break;
                    }
                },
            }
        }
    }

    fn tick(&mut self) {
        let timer = Timer::new();
        let report = self.state.advance(Instant::now());

        for name in &report.reaped {
            self.release(name);
        }
        self.sync_player_count();

        if cfg!(debug_assertions) {
            if let Err(err) = self.state.world().check_consistency() {
                error!(game = %self.state.name, error = %err, "World indexes out of step");
            }
        }

        let elapsed = timer.elapsed_ms();
        if elapsed > self.state.config.tick_period.as_millis() as u64 {
            warn!(
                game = %self.state.name,
                tick = report.tick,
                elapsed_ms = elapsed,
                "Tick overran its period"
            );
        }
        debug!(game = %self.state.name, tick = report.tick, served = report.served, "Tick complete");
    }

    fn handle(&mut self, command: GameCommand) {
        let now = Instant::now();
        match command {
            GameCommand::Join {
                player,
                viewport,
                reply,
            } => {
                let result = self.state.join(&player, viewport, now);
                self.sync_player_count();
                let _ = reply.send(result);
            }
            GameCommand::Update {
                player,
                input,
                reply,
            } => match self.state.request_update(&player, input, now) {
                Ok(UpdateOutcome::Ready(snapshot)) => {
                    let _ = reply.send(Ok(snapshot));
                }
                Ok(UpdateOutcome::Wait(id)) => self.state.park(id, player, reply),
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            GameCommand::Leave { player, reply } => {
                let result = self.state.leave(&player);
                if result.is_ok() {
                    self.release(&player);
                }
                self.sync_player_count();
                let _ = reply.send(result);
            }
        }
    }

    /// Free a player name held by this game
    fn release(&self, player: &str) {
        self.players
            .remove_if(player, |_, game| *game == self.state.name);
    }

    fn sync_player_count(&self) {
        self.player_count
            .store(self.state.player_count(), Ordering::Relaxed);
    }
}

/// Registry of running games plus the global player name index
pub struct GameRegistry {
    games: DashMap<String, GameHandle>,
    players: Arc<DashMap<String, String>>,
    config: GameConfig,
}

impl GameRegistry {
    pub fn new(config: GameConfig) -> Self {
        Self {
            games: DashMap::new(),
            players: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn get(&self, name: &str) -> Option<GameHandle> {
        self.games.get(name).map(|g| g.value().clone())
    }

    /// Generate a new game and spawn its actor.
    ///
    /// The maze is built before the name is claimed so no map shard stays
    /// locked during generation; a losing racer's game is simply dropped.
    pub fn create_game(&self, name: &str) -> Result<GameHandle, GameError> {
        if self.games.contains_key(name) {
            return Err(GameError::GameAlreadyExists(name.to_string()));
        }

        let seed = rand::thread_rng().gen();
        let (game, handle) = GameMatch::new(
            name.to_string(),
            self.config.clone(),
            seed,
            self.players.clone(),
        )?;

        match self.games.entry(name.to_string()) {
            Entry::Occupied(_) => Err(GameError::GameAlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
                tokio::spawn(game.run());

                info!(game = %name, "Game created");
                Ok(handle)
            }
        }
    }

    /// Create a game and join it as its first player
    pub async fn new_game(
        &self,
        game: &str,
        player: &str,
        viewport: Viewport,
    ) -> Result<Snapshot, GameError> {
        self.reserve(player, game)?;
        let handle = match self.create_game(game) {
            Ok(handle) => handle,
            Err(err) => {
                self.release(player, game);
                return Err(err);
            }
        };
        self.join_reserved(&handle, player, viewport).await
    }

    pub async fn join(
        &self,
        game: &str,
        player: &str,
        viewport: Viewport,
    ) -> Result<Snapshot, GameError> {
        let handle = self
            .get(game)
            .ok_or_else(|| GameError::GameNotFound(game.to_string()))?;
        self.reserve(player, game)?;
        self.join_reserved(&handle, player, viewport).await
    }

    pub async fn request_update(
        &self,
        player: &str,
        input: PlayerInput,
    ) -> Result<Snapshot, GameError> {
        self.handle_for(player)?.request_update(player, input).await
    }

    pub async fn leave(&self, player: &str) -> Result<(), GameError> {
        self.handle_for(player)?.leave(player).await
    }

    /// Every game with its player names
    pub fn list_games(&self) -> Vec<GameSummary> {
        let mut games: HashMap<String, Vec<String>> = self
            .games
            .iter()
            .map(|g| (g.key().clone(), Vec::new()))
            .collect();

        for entry in self.players.iter() {
            if let Some(players) = games.get_mut(entry.value()) {
                players.push(entry.key().clone());
            }
        }

        games
            .into_iter()
            .map(|(name, players)| GameSummary { name, players })
            .collect()
    }

    pub fn active_games(&self) -> usize {
        self.games.len()
    }

    pub fn total_players(&self) -> usize {
        self.games.iter().map(|g| g.value().player_count()).sum()
    }

    /// Claim a player name globally; it stays claimed until leave or reap
    fn reserve(&self, player: &str, game: &str) -> Result<(), GameError> {
        match self.players.entry(player.to_string()) {
            Entry::Occupied(taken) => Err(GameError::NameAlreadyInUse {
                name: player.to_string(),
                game: taken.get().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(game.to_string());
                Ok(())
            }
        }
    }

    fn release(&self, player: &str, game: &str) {
        self.players.remove_if(player, |_, g| g == game);
    }

    async fn join_reserved(
        &self,
        handle: &GameHandle,
        player: &str,
        viewport: Viewport,
    ) -> Result<Snapshot, GameError> {
        let result = handle.join(player, viewport).await;
        if let Err(err) = &result {
            warn!(game = %handle.name, player = %player, error = %err, "Join failed");
            self.release(player, &handle.name);
        }
        result
    }

    fn handle_for(&self, player: &str) -> Result<GameHandle, GameError> {
        let game = self
            .players
            .get(player)
            .map(|g| g.value().clone())
            .ok_or_else(|| GameError::PlayerNotFound(player.to_string()))?;
        self.get(&game).ok_or(GameError::GameNotFound(game))
    }
}

//! Fixed-step simulation: players, bullets, enemies, generators

use rand::Rng;
use tracing::debug;

use super::occupancy::Occupant;
use super::state::GameState;
use super::world::{Body, ObjectId, ObjectKind};
use super::Step;

/// Wall hits a diagonal bullet may bounce off within one sub-step
const MAX_BOUNCES_PER_STEP: u32 = 2;

/// Tiles ringing a generator's 2x2 footprint, relative to its anchor
const SPAWN_RING: [(i64, i64); 12] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (2, -1),
    (2, 0),
    (2, 1),
    (2, 2),
    (1, 2),
    (0, 2),
    (-1, 2),
    (-1, 1),
    (-1, 0),
];

impl GameState {
    /// Run the four phases in order. Later phases see positions already
    /// updated by earlier ones.
    pub(super) fn run_tick(&mut self) {
        self.update_players();
        self.update_bullets();
        self.update_enemies();
        self.run_generators();
    }

    /// Unlink a player from occupancy and start its respawn countdown
    fn kill_user(&mut self, id: ObjectId) {
        let delay = self.config.respawn_delay.max(1);
        self.world.unindex(id);
        if let Some(user) = self.world.user_mut(id) {
            user.dead_count = delay;
            user.fire_step = None;
            debug!(game = %self.name, player = %user.name, "Player died");
        }
    }

    fn update_players(&mut self) {
        for id in self.world.ids(ObjectKind::User) {
            let Some(user) = self.world.user_mut(id) else {
                continue;
            };
            let fire = user.fire_step.take();
            let step = user.move_step;

            if user.dead_count > 0 {
                user.dead_count -= 1;
                if user.dead_count > 0 {
                    // Ghost keeps drifting through empty tiles, never indexed
                    if let Some((x, y)) = self.world.random_empty_tile(&mut self.rng) {
                        self.world.move_to(id, x, y);
                    }
                    continue;
                }
                if !self.revive(id) {
                    continue;
                }
            }

            let Some(object) = self.world.get(id) else {
                continue;
            };
            let (x, y) = (object.x(), object.y());

            if !step.is_zero() {
                let (target, occupant) = self.world.occupancy_toward(x, y, step);
                match occupant {
                    Occupant::Empty => {
                        if let Some((tx, ty)) = target {
                            self.world.move_to(id, tx, ty);
                        }
                    }
                    Occupant::Wall | Occupant::User(_) => {}
                    Occupant::Enemy(_) | Occupant::Generator(_) => {
                        self.kill_user(id);
                        continue;
                    }
                    Occupant::Bullet(bullet) => {
                        self.world.despawn(bullet);
                        self.kill_user(id);
                        continue;
                    }
                }
            }

            if let Some(velocity) = fire.filter(|v| !v.is_zero()) {
                if let Some(object) = self.world.get(id) {
                    // Hidden under the shooter until the bullet phase carries it out
                    let (bx, by) = (object.x(), object.y());
                    self.world.spawn_bullet(bx, by, velocity);
                }
            }
        }
    }

    /// Re-link a player whose countdown ran out. Returns false when no tile
    /// is free, in which case the player stays dead for another tick.
    fn revive(&mut self, id: ObjectId) -> bool {
        let Some(object) = self.world.get(id) else {
            return false;
        };
        let (x, y) = (object.x(), object.y());

        let spot = if self.world.occupancy_at(x, y).is_empty() {
            Some((x, y))
        } else {
            self.world.random_empty_tile(&mut self.rng)
        };

        match spot {
            Some((x, y)) => {
                self.world.move_to(id, x, y);
                self.world.reindex(id);
                true
            }
            None => {
                if let Some(user) = self.world.user_mut(id) {
                    user.dead_count = 1;
                }
                false
            }
        }
    }

    fn update_bullets(&mut self) {
        let speed = self.config.bullet_speed;
        for id in self.world.ids(ObjectKind::Bullet) {
            for _ in 0..speed {
                if !self.advance_bullet(id) {
                    break;
                }
            }
        }
    }

    /// One bullet sub-step. Returns whether the bullet survives.
    fn advance_bullet(&mut self, id: ObjectId) -> bool {
        let mut bounces = 0;
        loop {
            let Some(object) = self.world.get(id) else {
                return false;
            };
            let Body::Bullet { velocity } = object.body else {
                return false;
            };
            let (x, y) = (object.x(), object.y());

            let (target, occupant) = self.world.occupancy_toward(x, y, velocity);
            match occupant {
                Occupant::Empty => {
                    if let Some((tx, ty)) = target {
                        self.world.move_to(id, tx, ty);
                    }
                    return true;
                }
                Occupant::Wall => {
                    if velocity.is_diagonal()
                        && self.config.diagonal_bullets_bounce
                        && bounces < MAX_BOUNCES_PER_STEP
                    {
                        bounces += 1;
                        let bounced = self.bounce(x, y, velocity);
                        if let Some(object) = self.world.get_mut(id) {
                            object.body = Body::Bullet { velocity: bounced };
                        }
                        continue;
                    }
                    self.world.despawn(id);
                    return false;
                }
                Occupant::User(user) => {
                    if self.config.bullets_kill_players {
                        self.kill_user(user);
                    }
                    self.world.despawn(id);
                    return false;
                }
                Occupant::Enemy(other) | Occupant::Bullet(other) => {
                    self.world.despawn(other);
                    self.world.despawn(id);
                    return false;
                }
                Occupant::Generator(generator) => {
                    if self.config.bullets_kill_generators {
                        self.world.remove_generator(generator);
                        debug!(game = %self.name, "Generator destroyed");
                    }
                    self.world.despawn(id);
                    return false;
                }
            }
        }
    }

    /// Flip the axis a diagonal bullet is actually blocked on; flip both
    /// when neither or both single-axis moves hit a wall.
    fn bounce(&self, x: u32, y: u32, velocity: Step) -> Step {
        let blocked = |step: Step| {
            matches!(
                self.world.occupancy_toward(x, y, step).1,
                Occupant::Wall
            )
        };
        let x_blocked = blocked(Step::new(velocity.dx, 0));
        let y_blocked = blocked(Step::new(0, velocity.dy));

        match (x_blocked, y_blocked) {
            (true, false) => Step::new(-velocity.dx, velocity.dy),
            (false, true) => Step::new(velocity.dx, -velocity.dy),
            _ => Step::new(-velocity.dx, -velocity.dy),
        }
    }

    fn update_enemies(&mut self) {
        let chance = self.config.enemy_move_probability;
        for id in self.world.ids(ObjectKind::Enemy) {
            if self.world.get(id).is_none() {
                continue;
            }
            if !self.rng.gen_bool(chance) {
                continue;
            }
            let step = Step::new(self.rng.gen_range(-1..=1), self.rng.gen_range(-1..=1));
            if !step.is_zero() {
                self.step_enemy(id, step);
            }
        }
    }

    /// Resolve one enemy step against whatever occupies the target tile
    fn step_enemy(&mut self, id: ObjectId, step: Step) {
        let Some(object) = self.world.get(id) else {
            return;
        };
        let (x, y) = (object.x(), object.y());

        let (target, occupant) = self.world.occupancy_toward(x, y, step);
        match occupant {
            Occupant::Empty => {
                if let Some((tx, ty)) = target {
                    self.world.move_to(id, tx, ty);
                }
            }
            Occupant::Wall | Occupant::Enemy(_) | Occupant::Generator(_) => {}
            Occupant::User(user) => self.kill_user(user),
            Occupant::Bullet(bullet) => {
                self.world.despawn(bullet);
                self.world.despawn(id);
            }
        }
    }

    fn run_generators(&mut self) {
        for id in self.world.generator_ids() {
            let Some(generator) = self.world.generator(id) else {
                continue;
            };
            let (gx, gy, chance) = (generator.x as i64, generator.y as i64, generator.probability);

            if !self.rng.gen_bool(chance) {
                continue;
            }
            let (ox, oy) = SPAWN_RING[self.rng.gen_range(0..SPAWN_RING.len())];
            let Some((x, y)) = self.world.normalize(gx + ox, gy + oy) else {
                continue;
            };
            if self.world.occupancy_at(x, y).is_empty() {
                self.world.spawn_enemy(x, y);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::state::tests::test_config;
    use crate::game::world::UserState;
    use crate::game::{PlayerInput, Viewport, CELL_SIZE};
    use tokio::time::Instant;

    fn quiet_config() -> GameConfig {
        GameConfig {
            generators_per_game: 0,
            ..test_config()
        }
    }

    fn state_with(config: GameConfig) -> GameState {
        GameState::new("test".into(), config, 99).unwrap()
    }

    fn add_user(state: &mut GameState, name: &str, x: u32, y: u32, step: Step) -> ObjectId {
        let mut user = UserState::new(name.into(), 400, 400, Instant::now());
        user.move_step = step;
        state.world.spawn(x, y, Body::User(Box::new(user)))
    }

    /// A cell (cx >= 1) whose left wall stands
    fn walled_cell(state: &GameState) -> (u32, u32) {
        let maze = state.world.maze();
        (0..maze.height())
            .flat_map(|cy| (1..maze.width()).map(move |cx| (cx, cy)))
            .find(|(cx, cy)| maze.v_wall(*cx, *cy))
            .expect("a maze keeps some inner walls")
    }

    fn position(state: &GameState, id: ObjectId) -> (u32, u32) {
        let object = state.world.get(id).unwrap();
        (object.x(), object.y())
    }

    #[test]
    fn player_moves_into_empty_tile() {
        let mut state = state_with(quiet_config());
        let id = add_user(&mut state, "ann", 25, 25, Step::new(1, 1));
        state.advance(Instant::now());
        assert_eq!(position(&state, id), (26, 26));
    }

    #[test]
    fn player_is_blocked_by_walls_and_players() {
        let mut state = state_with(quiet_config());
        let (cx, cy) = walled_cell(&state);
        let id = add_user(&mut state, "ann", cx * CELL_SIZE + 1, cy * CELL_SIZE + 5, Step::new(-1, 0));
        let other = add_user(&mut state, "bob", 45, 45, Step::new(0, 1));
        add_user(&mut state, "cy", 45, 46, Step::default());

        state.advance(Instant::now());
        assert_eq!(position(&state, id), (cx * CELL_SIZE + 1, cy * CELL_SIZE + 5));
        assert_eq!(position(&state, other), (45, 45));
    }

    #[test]
    fn walking_into_an_enemy_kills_the_player() {
        let mut state = state_with(quiet_config());
        let id = add_user(&mut state, "ann", 25, 25, Step::new(1, 0));
        state.world.spawn_enemy(26, 25);

        state.advance(Instant::now());
        let user = state.world.user(id).unwrap();
        assert_eq!(user.dead_count, state.config.respawn_delay);
        assert!(!state.world.get(id).unwrap().is_indexed());
        assert_eq!(state.player_names(), vec!["ann".to_string()]);
        assert!(state.world.check_consistency().is_ok());
    }

    #[test]
    fn walking_into_a_bullet_kills_both() {
        let mut state = state_with(quiet_config());
        let id = add_user(&mut state, "ann", 25, 25, Step::new(1, 0));
        state.world.spawn_bullet(26, 25, Step::new(0, 1));

        state.advance(Instant::now());
        assert!(!state.world.user(id).unwrap().is_alive());
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
    }

    #[test]
    fn dead_player_revives_and_is_relinked() {
        let config = GameConfig {
            respawn_delay: 3,
            ..quiet_config()
        };
        let mut state = state_with(config);
        let id = add_user(&mut state, "ann", 25, 25, Step::new(1, 0));
        state.world.spawn_enemy(26, 25);
        let now = Instant::now();

        state.advance(now);
        state.world.user_mut(id).unwrap().move_step = Step::default();
        assert!(!state.world.user(id).unwrap().is_alive());

        state.advance(now);
        state.advance(now);
        assert!(!state.world.get(id).unwrap().is_indexed());

        state.advance(now);
        assert!(state.world.user(id).unwrap().is_alive());
        assert!(state.world.get(id).unwrap().is_indexed());
        let (x, y) = position(&state, id);
        assert_eq!(state.world.occupancy_at(x, y), Occupant::User(id));
        assert!(state.world.check_consistency().is_ok());
    }

    #[test]
    fn bullets_travel_bullet_speed_tiles_per_tick() {
        let mut state = state_with(quiet_config());
        let id = state.world.spawn_bullet(22, 25, Step::new(1, 0));
        state.advance(Instant::now());
        assert_eq!(position(&state, id), (24, 25));
    }

    #[test]
    fn firing_spawns_a_bullet_that_leaves_the_shooter() {
        let mut state = state_with(quiet_config());
        let id = add_user(&mut state, "ann", 25, 25, Step::default());
        state.world.user_mut(id).unwrap().fire_step = Some(Step::new(1, 0));

        state.advance(Instant::now());
        let bullets = state.world.ids(ObjectKind::Bullet);
        assert_eq!(bullets.len(), 1);
        assert_eq!(position(&state, bullets[0]), (27, 25));
        assert!(state.world.user(id).unwrap().fire_step.is_none());
    }

    #[test]
    fn bullet_kills_player_when_enabled() {
        let mut state = state_with(quiet_config());
        let victim = add_user(&mut state, "ann", 26, 25, Step::default());
        state.world.spawn_bullet(25, 25, Step::new(1, 0));

        state.advance(Instant::now());
        assert!(!state.world.user(victim).unwrap().is_alive());
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
    }

    #[test]
    fn bullet_is_absorbed_when_players_are_immune() {
        let config = GameConfig {
            bullets_kill_players: false,
            ..quiet_config()
        };
        let mut state = state_with(config);
        let victim = add_user(&mut state, "ann", 26, 25, Step::default());
        state.world.spawn_bullet(25, 25, Step::new(1, 0));

        state.advance(Instant::now());
        assert!(state.world.user(victim).unwrap().is_alive());
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
    }

    #[test]
    fn bullet_and_enemy_destroy_each_other() {
        let mut state = state_with(quiet_config());
        state.world.spawn_bullet(25, 25, Step::new(1, 0));
        state.world.spawn_enemy(26, 25);

        state.advance(Instant::now());
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
        assert_eq!(state.world.count(ObjectKind::Enemy), 0);
    }

    #[test]
    fn bullet_destroys_generator_when_enabled() {
        let mut state = state_with(quiet_config());
        let generator = state.world.add_generator(30, 30, 0.0).unwrap();
        state.world.spawn_bullet(28, 30, Step::new(1, 0));

        state.advance(Instant::now());
        assert!(state.world.generator(generator).is_none());
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
    }

    #[test]
    fn generator_survives_when_immune() {
        let config = GameConfig {
            bullets_kill_generators: false,
            ..quiet_config()
        };
        let mut state = state_with(config);
        let generator = state.world.add_generator(30, 30, 0.0).unwrap();
        state.world.spawn_bullet(28, 30, Step::new(1, 0));

        state.advance(Instant::now());
        assert!(state.world.generator(generator).is_some());
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
    }

    #[test]
    fn straight_bullet_stops_at_a_wall() {
        let mut state = state_with(quiet_config());
        let (cx, cy) = walled_cell(&state);
        state
            .world
            .spawn_bullet(cx * CELL_SIZE + 1, cy * CELL_SIZE + 5, Step::new(-1, 0));

        state.advance(Instant::now());
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
    }

    #[test]
    fn diagonal_bullet_bounces_off_the_blocked_axis() {
        let config = GameConfig {
            maze_width: 32,
            maze_height: 32,
            wrap_enabled: true,
            bullets_kill_players: true,
            bullet_speed: 1,
            ..quiet_config()
        };
        let mut state = state_with(config);
        let (cx, cy) = walled_cell(&state);
        // Just left of a standing vertical wall, clear of its corner posts
        let x = cx * CELL_SIZE - 1;
        let y = cy * CELL_SIZE + 5;
        let id = state.world.spawn_bullet(x, y, Step::new(1, 1));

        state.advance(Instant::now());
        let object = state.world.get(id).expect("bullet bounced instead of dying");
        assert_eq!((object.x(), object.y()), (x - 1, y + 1));
        assert!(matches!(
            object.body,
            Body::Bullet { velocity } if velocity == Step::new(-1, 1)
        ));
    }

    #[test]
    fn bounce_disabled_destroys_diagonal_bullet() {
        let config = GameConfig {
            diagonal_bullets_bounce: false,
            ..quiet_config()
        };
        let mut state = state_with(config);
        let (cx, cy) = walled_cell(&state);
        state
            .world
            .spawn_bullet(cx * CELL_SIZE - 1, cy * CELL_SIZE + 5, Step::new(1, 1));

        state.advance(Instant::now());
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
    }

    #[test]
    fn enemy_moves_into_empty_tile() {
        let mut state = state_with(quiet_config());
        let id = state.world.spawn_enemy(25, 25);
        state.step_enemy(id, Step::new(-1, 1));
        assert_eq!(position(&state, id), (24, 26));
        assert!(state.world.check_consistency().is_ok());
    }

    #[test]
    fn enemy_kills_player_and_stays_put() {
        let mut state = state_with(quiet_config());
        let id = state.world.spawn_enemy(25, 25);
        let victim = add_user(&mut state, "ann", 26, 25, Step::default());

        state.step_enemy(id, Step::new(1, 0));
        assert_eq!(position(&state, id), (25, 25));
        let user = state.world.user(victim).unwrap();
        assert_eq!(user.dead_count, state.config.respawn_delay);
        assert!(!state.world.get(victim).unwrap().is_indexed());
    }

    #[test]
    fn enemy_and_bullet_destroy_each_other() {
        let mut state = state_with(quiet_config());
        let id = state.world.spawn_enemy(25, 25);
        state.world.spawn_bullet(25, 26, Step::new(1, 0));

        state.step_enemy(id, Step::new(0, 1));
        assert_eq!(state.world.count(ObjectKind::Enemy), 0);
        assert_eq!(state.world.count(ObjectKind::Bullet), 0);
        assert!(state.world.check_consistency().is_ok());
    }

    #[test]
    fn enemy_is_blocked_by_walls_enemies_and_generators() {
        let mut state = state_with(quiet_config());
        let (cx, cy) = walled_cell(&state);
        let (wx, wy) = (cx * CELL_SIZE + 1, cy * CELL_SIZE + 5);
        let by_wall = state.world.spawn_enemy(wx, wy);
        state.step_enemy(by_wall, Step::new(-1, 0));
        assert_eq!(position(&state, by_wall), (wx, wy));

        let mut state = state_with(quiet_config());
        let id = state.world.spawn_enemy(25, 25);
        let other = state.world.spawn_enemy(26, 25);
        let generator = state.world.add_generator(23, 23, 0.0).unwrap();

        state.step_enemy(id, Step::new(1, 0));
        state.step_enemy(id, Step::new(-1, -1));
        assert_eq!(position(&state, id), (25, 25));
        assert_eq!(position(&state, other), (26, 25));
        assert!(state.world.generator(generator).is_some());
        assert_eq!(state.world.count(ObjectKind::Enemy), 2);
    }

    #[test]
    fn surrounded_enemy_kills_one_neighbour_per_tick() {
        let config = GameConfig {
            enemy_move_probability: 1.0,
            ..quiet_config()
        };
        let mut state = state_with(config);
        let enemy = state.world.spawn_enemy(25, 25);
        let mut users = Vec::new();
        for (i, (dx, dy)) in [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ]
        .into_iter()
        .enumerate()
        {
            let x = (25 + dx) as u32;
            let y = (25 + dy) as u32;
            users.push(add_user(&mut state, &format!("p{}", i), x, y, Step::default()));
        }

        let dead = |state: &GameState| {
            users
                .iter()
                .filter(|id| !state.world.user(**id).unwrap().is_alive())
                .count()
        };
        let now = Instant::now();
        // a zero step is possible, so allow a few ticks for the first move
        for _ in 0..20 {
            state.advance(now);
            if dead(&state) > 0 {
                break;
            }
        }
        assert_eq!(dead(&state), 1);
        assert_eq!(position(&state, enemy), (25, 25));
        assert!(state.world.check_consistency().is_ok());
    }

    #[test]
    fn generators_spawn_enemies_on_their_ring() {
        let config = GameConfig {
            generators_per_game: 1,
            default_generator_probability: 1.0,
            ..quiet_config()
        };
        let mut state = state_with(config);
        let id = state.world.generator_ids()[0];
        let (gx, gy) = {
            let generator = state.world.generator(id).unwrap();
            (generator.x as i64, generator.y as i64)
        };

        let now = Instant::now();
        for _ in 0..20 {
            state.advance(now);
        }
        let enemies = state.world.ids(ObjectKind::Enemy);
        assert!(!enemies.is_empty());
        for enemy in enemies {
            let tile = position(&state, enemy);
            assert!(SPAWN_RING
                .iter()
                .any(|(dx, dy)| state.world.normalize(gx + dx, gy + dy) == Some(tile)));
        }
    }

    #[test]
    fn indexes_stay_consistent_under_churn() {
        let config = GameConfig {
            maze_width: 3,
            maze_height: 3,
            generators_per_game: 3,
            default_generator_probability: 0.3,
            enemy_move_probability: 0.5,
            respawn_delay: 4,
            ..test_config()
        };
        let mut state = state_with(config);
        let now = Instant::now();
        for name in ["a", "b", "c", "d"] {
            state.join(name, Viewport::default(), now).unwrap();
        }

        for tick in 0..300u32 {
            for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
                let turn = (tick as i32 + i as i32) % 3 - 1;
                let input = PlayerInput {
                    move_step: Some(Step::new(turn, (i as i32 % 3) - 1)),
                    fire: (tick % 4 == 0).then(|| Step::new(1, turn)),
                };
                state.request_update(name, input, now).unwrap();
            }
            state.advance(now);
            state.world.check_consistency().unwrap();

            for kind in [ObjectKind::Bullet, ObjectKind::Enemy] {
                for id in state.world.ids(kind) {
                    let (x, y) = position(&state, id);
                    assert!(!state.world.maze().is_wall_tile(x, y));
                }
            }
        }
    }
}

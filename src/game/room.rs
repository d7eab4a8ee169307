//! Room state and the authoritative simulation tick

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::{PlayerProfile, ServerMsg};

use super::countdown::{Countdown, CountdownStep};
use super::entity::{Pipe, Player};
use super::physics::{
    PhysicsSystem, PIPE_GAP_MIN, PIPE_GAP_RANGE, PIPE_SPAWN_INTERVAL_MS, PIPE_SPEED,
};
use super::snapshot::SnapshotBuilder;

/// Maximum players per room
pub const MAX_PLAYERS: usize = 2;

/// Capacity of a room's broadcast channel
const EVENT_CHANNEL_SIZE: usize = 64;

/// Counter for generating unique room ids
static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique room identifier. Ids increase in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl RoomId {
    pub fn next() -> Self {
        Self(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room-{}", self.0)
    }
}

/// What the tick loop should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep ticking
    Running,
    /// The round ended this tick
    GameOver,
    /// The room is not running a round
    Stopped,
}

/// Owned handle to a room's countdown/simulation task.
/// Dropping it aborts the task, so a deleted room never ticks again.
#[derive(Debug)]
pub struct RoomTask(AbortHandle);

impl RoomTask {
    pub fn new(handle: AbortHandle) -> Self {
        Self(handle)
    }
}

impl Drop for RoomTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A two-player session (owned by the registry)
pub struct Room {
    pub id: RoomId,
    /// Join order is player-number order
    pub players: Vec<Player>,
    /// Spawn order
    pub pipes: Vec<Pipe>,
    pub started: bool,
    pub last_pipe_spawn: Instant,
    pub countdown: Countdown,
    pub tick: u64,
    rng: ChaCha8Rng,
    events: broadcast::Sender<ServerMsg>,
    task: Option<RoomTask>,
}

impl Room {
    pub fn new(id: RoomId, seed: u64, now: Instant) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            id,
            players: Vec::with_capacity(MAX_PLAYERS),
            pipes: Vec::new(),
            started: false,
            last_pipe_spawn: now,
            countdown: Countdown::default(),
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            events,
            task: None,
        }
    }

    /// Accepts new players only while not full and not running
    pub fn is_joinable(&self) -> bool {
        self.players.len() < MAX_PLAYERS && !self.started
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events.subscribe()
    }

    /// Send to every member. Having no subscribers is not an error.
    pub fn broadcast(&self, msg: ServerMsg) {
        let _ = self.events.send(msg);
    }

    /// Append a player and return its 1-based player number
    pub fn add_player(&mut self, id: Uuid, profile: PlayerProfile) -> usize {
        self.players.push(Player::new(id, profile));
        self.players.len()
    }

    pub fn remove_player(&mut self, id: Uuid) -> Option<Player> {
        let pos = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(pos))
    }

    /// Queue a flap for the next tick. Only alive players in a running round can flap.
    pub fn flap(&mut self, id: Uuid) -> bool {
        if !self.started {
            return false;
        }
        match self.players.iter_mut().find(|p| p.id == id) {
            Some(player) if player.alive => {
                player.flap_pending = true;
                true
            }
            _ => false,
        }
    }

    /// Attach the task driving this room. A previous task has already run to completion.
    pub fn set_task(&mut self, task: RoomTask) {
        if self.task.replace(task).is_some() {
            debug!(room_id = %self.id, "Replaced finished room task");
        }
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.alive).count()
    }

    /// Advance the countdown by one step and broadcast the result
    pub fn countdown_step(&mut self, now: Instant) -> CountdownStep {
        let step = self.countdown.step();
        match step {
            CountdownStep::Show(value) => {
                self.broadcast(ServerMsg::Countdown { value });
            }
            CountdownStep::Fire => {
                self.begin_round(now);
                self.broadcast(ServerMsg::Start {});
                info!(room_id = %self.id, players = self.players.len(), "Round started");
            }
            CountdownStep::Done => {}
        }
        step
    }

    /// Reset the field and mark the room as running
    pub fn begin_round(&mut self, now: Instant) {
        self.pipes.clear();
        for player in &mut self.players {
            player.respawn();
        }
        self.last_pipe_spawn = now;
        self.tick = 0;
        self.started = true;
    }

    /// Run a single simulation tick
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.started {
            return TickOutcome::Stopped;
        }
        self.tick += 1;

        self.spawn_pipe_if_due(now);
        self.advance_pipes();
        self.update_players();
        self.resolve_collisions();

        self.broadcast(SnapshotBuilder::state(&self.players, &self.pipes));

        if self.round_over() {
            let winner = self.select_winner();
            self.finish(winner);
            return TickOutcome::GameOver;
        }

        TickOutcome::Running
    }

    fn spawn_pipe_if_due(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_pipe_spawn);
        if elapsed > Duration::from_millis(PIPE_SPAWN_INTERVAL_MS) {
            let gap_y = self
                .rng
                .gen_range(PIPE_GAP_MIN..PIPE_GAP_MIN + PIPE_GAP_RANGE);
            self.pipes.push(Pipe::spawn(gap_y));
            self.last_pipe_spawn = now;
            debug!(room_id = %self.id, gap_y, "Pipe spawned");
        }
    }

    /// Scroll pipes, apply shared scoring and drop pipes that left the screen
    fn advance_pipes(&mut self) {
        let mut cleared = 0;
        for pipe in &mut self.pipes {
            pipe.x -= PIPE_SPEED;
            if !pipe.passed && PhysicsSystem::pipe_cleared(pipe.x) {
                pipe.passed = true;
                cleared += 1;
            }
        }

        if cleared > 0 {
            for player in self.players.iter_mut().filter(|p| p.alive) {
                player.score += cleared;
            }
        }

        self.pipes.retain(|p| !PhysicsSystem::pipe_offscreen(p.x));
    }

    fn update_players(&mut self) {
        for player in self.players.iter_mut().filter(|p| p.alive) {
            let flap = std::mem::take(&mut player.flap_pending);
            let (y, velocity) = PhysicsSystem::step(player.y, player.velocity, flap);
            player.y = y;
            player.velocity = velocity;

            if PhysicsSystem::out_of_bounds(y) {
                player.alive = false;
                debug!(room_id = %self.id, player_id = %player.id, "Player left bounds");
            }
        }
    }

    /// Check every alive player against every pipe in range
    fn resolve_collisions(&mut self) {
        let pipes = &self.pipes;
        for player in self.players.iter_mut().filter(|p| p.alive) {
            if pipes
                .iter()
                .any(|pipe| PhysicsSystem::hits_pipe(player.y, pipe.x, pipe.gap_y))
            {
                player.alive = false;
                debug!(room_id = %self.id, player_id = %player.id, "Player hit a pipe");
            }
        }
    }

    fn round_over(&self) -> bool {
        let alive = self.alive_count();
        alive == 0 || (self.players.len() == MAX_PLAYERS && alive == 1)
    }

    /// Sole survivor if any, otherwise the strictly highest score (first joined on ties)
    fn select_winner(&self) -> usize {
        if let Some(survivor) = self.players.iter().position(|p| p.alive) {
            return survivor;
        }

        let mut best = 0;
        for (i, player) in self.players.iter().enumerate().skip(1) {
            if player.score > self.players[best].score {
                best = i;
            }
        }
        best
    }

    fn finish(&mut self, winner: usize) {
        self.started = false;
        self.countdown.reset();
        self.broadcast(SnapshotBuilder::game_over(&self.players, winner));

        info!(
            room_id = %self.id,
            tick = self.tick,
            winner = self.players.get(winner).map(|p| p.name.as_str()).unwrap_or_default(),
            "Game over"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{JUMP_IMPULSE, MAX_Y, PIPE_SPAWN_X, SPAWN_Y};

    fn running_room(names: &[&str]) -> (Room, Instant, Vec<Uuid>) {
        let now = Instant::now();
        let mut room = Room::new(RoomId::next(), 7, now);
        let ids: Vec<Uuid> = names
            .iter()
            .map(|name| {
                let id = Uuid::new_v4();
                room.add_player(id, PlayerProfile::new(*name, "default"));
                id
            })
            .collect();
        room.begin_round(now);
        (room, now, ids)
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    #[test]
    fn room_ids_are_unique_and_ordered() {
        let a = RoomId::next();
        let b = RoomId::next();
        assert!(a < b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn joinable_only_while_not_full_and_not_started() {
        let mut room = Room::new(RoomId::next(), 1, Instant::now());
        assert!(room.is_joinable());
        assert_eq!(room.add_player(Uuid::new_v4(), PlayerProfile::new("a", "x")), 1);
        assert!(room.is_joinable());
        assert_eq!(room.add_player(Uuid::new_v4(), PlayerProfile::new("b", "y")), 2);
        assert!(!room.is_joinable());

        let first = room.players[0].id;
        room.remove_player(first);
        room.started = true;
        assert!(!room.is_joinable());
    }

    #[test]
    fn flap_then_tick_moves_by_jump_impulse() {
        let (mut room, now, ids) = running_room(&["solo"]);
        room.players[0].velocity = 6.0;
        let old_y = room.players[0].y;

        assert!(room.flap(ids[0]));
        assert_eq!(room.tick(now), TickOutcome::Running);

        assert_eq!(room.players[0].y, old_y + JUMP_IMPULSE);
        assert_eq!(room.players[0].velocity, JUMP_IMPULSE);
        assert!(!room.players[0].flap_pending);
    }

    #[test]
    fn flap_is_ignored_before_start_and_when_dead() {
        let mut room = Room::new(RoomId::next(), 1, Instant::now());
        let id = Uuid::new_v4();
        room.add_player(id, PlayerProfile::new("a", "x"));
        assert!(!room.flap(id));

        room.begin_round(Instant::now());
        room.players[0].alive = false;
        assert!(!room.flap(id));
        assert!(!room.flap(Uuid::new_v4()));
    }

    #[test]
    fn pipe_spawns_only_after_interval() {
        let (mut room, now, _) = running_room(&["a", "b"]);

        room.spawn_pipe_if_due(now + Duration::from_millis(PIPE_SPAWN_INTERVAL_MS));
        assert!(room.pipes.is_empty());

        let later = now + Duration::from_millis(PIPE_SPAWN_INTERVAL_MS + 1);
        room.spawn_pipe_if_due(later);
        assert_eq!(room.pipes.len(), 1);
        assert_eq!(room.pipes[0].x, PIPE_SPAWN_X);
        assert!((PIPE_GAP_MIN..PIPE_GAP_MIN + PIPE_GAP_RANGE).contains(&room.pipes[0].gap_y));
        assert_eq!(room.last_pipe_spawn, later);

        room.spawn_pipe_if_due(later + Duration::from_millis(10));
        assert_eq!(room.pipes.len(), 1);
    }

    #[test]
    fn spawned_pipe_is_removed_after_243_advances() {
        let (mut room, _, _) = running_room(&["a", "b"]);
        room.pipes.push(Pipe::spawn(200.0));

        for _ in 0..242 {
            room.advance_pipes();
        }
        assert_eq!(room.pipes.len(), 1);

        room.advance_pipes();
        assert!(room.pipes.is_empty());
    }

    #[test]
    fn cleared_pipe_scores_once_for_every_alive_player() {
        let (mut room, _, _) = running_room(&["a", "b"]);
        room.players[1].alive = false;
        // trailing edge moves from 153 to 149 on the next advance
        room.pipes.push(Pipe {
            x: 83.0,
            gap_y: 200.0,
            passed: false,
        });

        room.advance_pipes();
        assert!(room.pipes[0].passed);
        assert_eq!(room.players[0].score, 1);
        assert_eq!(room.players[1].score, 0);

        room.advance_pipes();
        assert_eq!(room.players[0].score, 1);
    }

    #[test]
    fn collision_checks_every_pipe_in_range() {
        let (mut room, _, _) = running_room(&["a", "b"]);
        room.players[0].y = 250.0;
        room.players[1].y = 150.0;
        room.pipes.push(Pipe {
            x: 150.0,
            gap_y: 200.0,
            passed: false,
        });
        room.pipes.push(Pipe {
            x: 100.0,
            gap_y: 0.0,
            passed: false,
        });

        room.resolve_collisions();
        // player 0 is inside the first gap but below the second
        assert!(!room.players[0].alive);
        assert!(!room.players[1].alive);
    }

    #[test]
    fn one_player_out_of_bounds_ends_round_for_the_other() {
        let (mut room, now, ids) = running_room(&["ada", "bob"]);
        let mut rx = room.subscribe();
        room.players[0].y = MAX_Y - 1.0;
        room.players[0].velocity = 5.0;

        assert_eq!(room.tick(now), TickOutcome::GameOver);
        assert!(!room.started);
        assert!(room.countdown.is_idle());
        assert!(!room.players[0].alive);
        assert!(room.players[1].alive);

        let msgs = drain(&mut rx);
        assert!(matches!(msgs[0], ServerMsg::State { .. }));
        match &msgs[1] {
            ServerMsg::GameOver { winner, scores, .. } => {
                assert_eq!(winner, "bob");
                assert!(!scores[0].is_winner);
                assert!(scores[1].is_winner);
            }
            other => panic!("expected game over, got {other:?}"),
        }
        assert_eq!(room.players[1].id, ids[1]);
        assert_eq!(room.tick(now), TickOutcome::Stopped);
    }

    #[test]
    fn simultaneous_death_goes_to_higher_score() {
        let (mut room, now, _) = running_room(&["ada", "bob"]);
        let mut rx = room.subscribe();
        for (player, score) in room.players.iter_mut().zip([3, 5]) {
            player.y = MAX_Y - 1.0;
            player.velocity = 5.0;
            player.score = score;
        }

        assert_eq!(room.tick(now), TickOutcome::GameOver);
        let msgs = drain(&mut rx);
        match msgs.last() {
            Some(ServerMsg::GameOver { winner, scores, .. }) => {
                assert_eq!(winner, "bob");
                assert_eq!(scores[1].score, 5);
                assert!(scores[1].is_winner);
            }
            other => panic!("expected game over, got {other:?}"),
        }
    }

    #[test]
    fn score_tie_goes_to_first_joined() {
        let (mut room, now, _) = running_room(&["ada", "bob"]);
        let mut rx = room.subscribe();
        for player in &mut room.players {
            player.y = MAX_Y - 1.0;
            player.velocity = 5.0;
            player.score = 2;
        }

        assert_eq!(room.tick(now), TickOutcome::GameOver);
        match drain(&mut rx).last() {
            Some(ServerMsg::GameOver { winner, .. }) => assert_eq!(winner, "ada"),
            other => panic!("expected game over, got {other:?}"),
        }
    }

    #[test]
    fn remaining_player_keeps_simulating_after_co_member_leaves() {
        let (mut room, now, ids) = running_room(&["ada", "bob"]);
        room.remove_player(ids[0]);

        assert_eq!(room.tick(now), TickOutcome::Running);
        assert!(room.started);

        room.players[0].y = MAX_Y - 1.0;
        room.players[0].velocity = 5.0;
        assert_eq!(room.tick(now), TickOutcome::GameOver);
    }

    #[test]
    fn countdown_fires_into_a_fresh_round() {
        let now = Instant::now();
        let mut room = Room::new(RoomId::next(), 3, now);
        room.add_player(Uuid::new_v4(), PlayerProfile::new("a", "x"));
        room.add_player(Uuid::new_v4(), PlayerProfile::new("b", "y"));
        room.players[0].score = 9;
        room.players[1].alive = false;
        room.pipes.push(Pipe::spawn(150.0));
        let mut rx = room.subscribe();

        for _ in 0..3 {
            assert!(matches!(room.countdown_step(now), CountdownStep::Show(_)));
        }
        assert!(!room.started);
        assert_eq!(room.countdown_step(now), CountdownStep::Fire);

        assert!(room.started);
        assert!(room.pipes.is_empty());
        assert!(room.players.iter().all(|p| p.alive && p.score == 0 && p.y == SPAWN_Y));

        let values: Vec<_> = drain(&mut rx)
            .into_iter()
            .map(|msg| match msg {
                ServerMsg::Countdown { value } => value.to_string(),
                ServerMsg::Start {} => "start".to_string(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(values, ["3", "2", "1", "start"]);
    }
}

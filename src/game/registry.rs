//! Room registry: matchmaking, teardown and the per-room task
//!
//! Every mutation of room state happens under the registry lock inside a
//! synchronous call, so intents, countdown steps and ticks never interleave
//! within a room. Each room owns at most one task; it drives the countdown and
//! then the tick loop, holding only a weak reference back to the registry.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::tick_duration;
use crate::ws::protocol::{PlayerProfile, ServerMsg};

use super::countdown::{CountdownStep, COUNTDOWN_STEP};
use super::room::{Room, RoomId, RoomTask, TickOutcome, MAX_PLAYERS};
use super::snapshot::SnapshotBuilder;

/// Result of a successful join
#[derive(Debug)]
pub struct JoinTicket {
    pub room_id: RoomId,
    /// 1-based, in join order
    pub player_number: usize,
    /// Room broadcasts, subscribed before the roster update for this join
    pub events: broadcast::Receiver<ServerMsg>,
}

#[derive(Default)]
struct RoomTable {
    /// Ordered by id, which is creation order
    rooms: BTreeMap<RoomId, Room>,
    /// Maps each player to the room they're in
    player_rooms: HashMap<Uuid, RoomId>,
}

/// Registry of all rooms
#[derive(Default)]
pub struct RoomRegistry {
    table: Mutex<RoomTable>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seat a player in the first joinable room, creating one if needed.
    /// Returns `None` if the connection is already seated.
    pub fn join(self: &Arc<Self>, player_id: Uuid, profile: PlayerProfile) -> Option<JoinTicket> {
        let mut table = self.table.lock();

        if let Some(current) = table.player_rooms.get(&player_id) {
            warn!(player_id = %player_id, room_id = %current, "Player already in a room");
            return None;
        }

        let existing = table
            .rooms
            .values()
            .find(|room| room.is_joinable())
            .map(|room| room.id);

        let room_id = match existing {
            Some(id) => id,
            None => {
                let id = RoomId::next();
                table
                    .rooms
                    .insert(id, Room::new(id, rand::random::<u64>(), Instant::now()));
                info!(room_id = %id, "Room created");
                id
            }
        };
        table.player_rooms.insert(player_id, room_id);

        let room = table.rooms.get_mut(&room_id)?;
        let events = room.subscribe();
        let player_number = room.add_player(player_id, profile);
        room.broadcast(SnapshotBuilder::players(&room.players));

        info!(
            room_id = %room_id,
            player_id = %player_id,
            player_number,
            "Player joined room"
        );

        if room.players.len() == MAX_PLAYERS && room.countdown.is_idle() {
            // first value goes out now, the task takes over one step later
            room.countdown_step(Instant::now());
            let task = tokio::spawn(run_room(Arc::downgrade(self), room_id));
            room.set_task(RoomTask::new(task.abort_handle()));
        }

        Some(JoinTicket {
            room_id,
            player_number,
            events,
        })
    }

    /// Remove a player from its room, deleting the room once empty.
    /// Returns false if the player was not seated anywhere.
    pub fn leave(&self, player_id: Uuid) -> bool {
        let mut table = self.table.lock();

        let Some(room_id) = table.player_rooms.remove(&player_id) else {
            return false;
        };
        let Some(room) = table.rooms.get_mut(&room_id) else {
            return false;
        };

        room.remove_player(player_id);
        info!(room_id = %room_id, player_id = %player_id, "Player left room");

        if room.is_empty() {
            // dropping the room aborts its task
            table.rooms.remove(&room_id);
            info!(room_id = %room_id, "Room deleted");
        } else {
            room.broadcast(ServerMsg::PlayerLeft { player_id });
            room.broadcast(SnapshotBuilder::players(&room.players));
        }
        true
    }

    /// Route a flap intent. Returns whether it took effect.
    pub fn flap(&self, player_id: Uuid) -> bool {
        let mut table = self.table.lock();
        let RoomTable {
            rooms,
            player_rooms,
        } = &mut *table;

        player_rooms
            .get(&player_id)
            .and_then(|room_id| rooms.get_mut(room_id))
            .is_some_and(|room| room.flap(player_id))
    }

    #[cfg(test)]
    pub fn room_of(&self, player_id: &Uuid) -> Option<RoomId> {
        self.table.lock().player_rooms.get(player_id).copied()
    }

    /// Run `f` against a room while holding the lock
    #[cfg(test)]
    pub fn with_room<R>(&self, room_id: RoomId, f: impl FnOnce(&Room) -> R) -> Option<R> {
        self.table.lock().rooms.get(&room_id).map(f)
    }

    pub fn room_count(&self) -> usize {
        self.table.lock().rooms.len()
    }

    pub fn player_count(&self) -> usize {
        self.table.lock().player_rooms.len()
    }

    fn countdown_step(&self, room_id: RoomId) -> Option<CountdownStep> {
        let mut table = self.table.lock();
        let room = table.rooms.get_mut(&room_id)?;
        Some(room.countdown_step(Instant::now()))
    }

    fn tick_room(&self, room_id: RoomId) -> Option<TickOutcome> {
        let mut table = self.table.lock();
        let room = table.rooms.get_mut(&room_id)?;
        Some(room.tick(Instant::now()))
    }
}

/// Drive one room: remaining countdown steps, then the fixed-rate tick loop.
/// A missing room or registry ends the task quietly.
async fn run_room(registry: Weak<RoomRegistry>, room_id: RoomId) {
    let mut steps = interval_at(Instant::now() + COUNTDOWN_STEP, COUNTDOWN_STEP);
    loop {
        steps.tick().await;
        let Some(live) = registry.upgrade() else {
            return;
        };
        match live.countdown_step(room_id) {
            Some(CountdownStep::Show(_)) => {}
            Some(CountdownStep::Fire) => break,
            Some(CountdownStep::Done) | None => {
                debug!(room_id = %room_id, "Countdown cancelled");
                return;
            }
        }
    }

    // late ticks are delayed, never skipped or batched
    let mut ticks = interval(tick_duration());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let Some(live) = registry.upgrade() else {
            return;
        };
        match live.tick_room(room_id) {
            Some(TickOutcome::Running) => {}
            outcome => {
                debug!(room_id = %room_id, ?outcome, "Tick loop stopped");
                return;
            }
        }
    }
}

//! Entity records owned by a room

use uuid::Uuid;

use crate::ws::protocol::{PipeSnapshot, PlayerProfile, PlayerSnapshot};

use super::physics::{PIPE_SPAWN_X, SPAWN_Y};

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    /// Connection id of the owning socket
    pub id: Uuid,
    pub name: String,
    pub avatar: String,

    pub y: f32,
    pub velocity: f32,

    pub score: u32,
    pub alive: bool,

    /// Set by a flap intent, consumed by the next tick
    pub flap_pending: bool,
}

impl Player {
    pub fn new(id: Uuid, profile: PlayerProfile) -> Self {
        Self {
            id,
            name: profile.name,
            avatar: profile.avatar,
            y: SPAWN_Y,
            velocity: 0.0,
            score: 0,
            alive: true,
            flap_pending: false,
        }
    }

    /// Put the player back at the spawn point for a fresh round
    pub fn respawn(&mut self) {
        self.y = SPAWN_Y;
        self.velocity = 0.0;
        self.score = 0;
        self.alive = true;
        self.flap_pending = false;
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            y: self.y,
            velocity: self.velocity,
            score: self.score,
            alive: self.alive,
        }
    }
}

/// A scrolling obstacle shared by every player in the room
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    pub x: f32,
    /// Top edge of the gap
    pub gap_y: f32,
    /// Scoring already applied
    pub passed: bool,
}

impl Pipe {
    /// A fresh pipe at the off-screen spawn column
    pub fn spawn(gap_y: f32) -> Self {
        Self {
            x: PIPE_SPAWN_X,
            gap_y,
            passed: false,
        }
    }

    pub fn snapshot(&self) -> PipeSnapshot {
        PipeSnapshot {
            x: self.x,
            gap_y: self.gap_y,
            passed: self.passed,
        }
    }
}

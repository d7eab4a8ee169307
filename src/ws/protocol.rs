//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::RoomId;

/// Avatar used when the client sends none
pub const DEFAULT_AVATAR: &str = "default";

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Request a seat in a room
    Join(JoinRequest),

    /// Jump impulse for the sender's player
    Flap,
}

/// Raw join payload. Fields stay untyped until coerced into a [`PlayerProfile`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub avatar: Value,
}

impl JoinRequest {
    /// Coerce the untyped payload, falling back to defaults instead of rejecting
    pub fn into_profile(self) -> PlayerProfile {
        let name = match self.name {
            Value::String(name) => name,
            _ => String::new(),
        };
        let avatar = match self.avatar {
            Value::String(avatar) if !avatar.is_empty() => avatar,
            _ => DEFAULT_AVATAR.to_string(),
        };
        PlayerProfile::new(name, avatar)
    }
}

/// Validated player-creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub name: String,
    pub avatar: String,
}

impl PlayerProfile {
    pub fn new(name: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: avatar.into(),
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Seat confirmation, sent only to the joining connection
    #[serde(rename_all = "camelCase")]
    Joined {
        room_id: RoomId,
        player_id: Uuid,
        player_number: usize,
    },

    /// Current roster of the room
    Players {
        players: Vec<PlayerSnapshot>,
    },

    /// Seconds left before the round starts
    Countdown {
        value: u32,
    },

    /// Round has started
    Start {},

    /// Authoritative state, sent every tick while running
    State {
        players: Vec<PlayerSnapshot>,
        pipes: Vec<PipeSnapshot>,
    },

    /// A co-member disconnected
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        player_id: Uuid,
    },

    /// Round has ended
    #[serde(rename_all = "camelCase")]
    GameOver {
        winner: String,
        winner_avatar: String,
        scores: Vec<ScoreEntry>,
    },
}

/// Player state as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
    /// Vertical position
    pub y: f32,
    /// Vertical velocity
    pub velocity: f32,
    pub score: u32,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeSnapshot {
    pub x: f32,
    /// Top edge of the gap
    pub gap_y: f32,
    pub passed: bool,
}

/// Per-player line of the game-over summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub name: String,
    pub avatar: String,
    pub score: u32,
    pub is_winner: bool,
}

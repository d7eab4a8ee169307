//! Outbound room message building

use crate::ws::protocol::{ScoreEntry, ServerMsg};

use super::entity::{Pipe, Player};

/// Builds the room-wide messages clients render from
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Roster message sent whenever membership changes
    pub fn players(players: &[Player]) -> ServerMsg {
        ServerMsg::Players {
            players: players.iter().map(Player::snapshot).collect(),
        }
    }

    /// Full state message, sent every tick (no deltas)
    pub fn state(players: &[Player], pipes: &[Pipe]) -> ServerMsg {
        ServerMsg::State {
            players: players.iter().map(Player::snapshot).collect(),
            pipes: pipes.iter().map(Pipe::snapshot).collect(),
        }
    }

    /// Game-over summary with `winner` as an index into `players`
    pub fn game_over(players: &[Player], winner: usize) -> ServerMsg {
        let (winner_name, winner_avatar) = players
            .get(winner)
            .map(|p| (p.name.clone(), p.avatar.clone()))
            .unwrap_or_default();

        let scores = players
            .iter()
            .enumerate()
            .map(|(i, p)| ScoreEntry {
                name: p.name.clone(),
                avatar: p.avatar.clone(),
                score: p.score,
                is_winner: i == winner,
            })
            .collect();

        ServerMsg::GameOver {
            winner: winner_name,
            winner_avatar,
            scores,
        }
    }
}

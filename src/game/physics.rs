//! Flight physics and obstacle geometry
//!
//! All values are in world units and per-tick quantities; the simulation
//! never scales by wall-clock delta.

/// Downward acceleration added to velocity every tick
pub const GRAVITY: f32 = 0.4;
/// Velocity a flap resets to (negative = upward)
pub const JUMP_IMPULSE: f32 = -9.0;
/// Vertical position of a freshly spawned player
pub const SPAWN_Y: f32 = 300.0;
/// Upper playfield bound
pub const MIN_Y: f32 = 30.0;
/// Lower playfield bound
pub const MAX_Y: f32 = 570.0;
/// Fixed column every player flies in
pub const PLAYER_X: f32 = 150.0;

/// Horizontal width of a pipe
pub const PIPE_WIDTH: f32 = 70.0;
/// Vertical size of the opening in a pipe
pub const PIPE_GAP_HEIGHT: f32 = 200.0;
/// Horizontal distance a pipe scrolls per tick
pub const PIPE_SPEED: f32 = 4.0;
/// Off-screen column pipes spawn at
pub const PIPE_SPAWN_X: f32 = 900.0;
/// Lowest gap position a pipe can spawn with
pub const PIPE_GAP_MIN: f32 = 120.0;
/// Width of the range gap positions are sampled from
pub const PIPE_GAP_RANGE: f32 = 280.0;
/// Pipes spawn once more than this many milliseconds passed since the last one
pub const PIPE_SPAWN_INTERVAL_MS: u64 = 2000;
/// How far left of a pipe's x the player's hitbox starts overlapping it
pub const PIPE_HIT_MARGIN: f32 = 25.0;

/// Physics system for player flight and pipe interaction
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance one player by one tick of explicit Euler integration.
    /// A pending flap replaces the velocity instead of adding to it.
    /// Returns (new_y, new_velocity)
    pub fn step(y: f32, velocity: f32, flap: bool) -> (f32, f32) {
        let mut velocity = velocity + GRAVITY;
        if flap {
            velocity = JUMP_IMPULSE;
        }
        (y + velocity, velocity)
    }

    /// Check if a vertical position left the playfield
    pub fn out_of_bounds(y: f32) -> bool {
        !(MIN_Y..=MAX_Y).contains(&y)
    }

    /// Check if the player column overlaps a pipe at `pipe_x`
    pub fn pipe_in_range(pipe_x: f32) -> bool {
        (pipe_x - PIPE_HIT_MARGIN..pipe_x + PIPE_WIDTH).contains(&PLAYER_X)
    }

    /// Check if a player at `y` hits the solid part of a pipe whose gap starts at `gap_y`
    pub fn hits_pipe(y: f32, pipe_x: f32, gap_y: f32) -> bool {
        Self::pipe_in_range(pipe_x) && !(gap_y..gap_y + PIPE_GAP_HEIGHT).contains(&y)
    }

    /// Check if a pipe's trailing edge is past the player column
    pub fn pipe_cleared(pipe_x: f32) -> bool {
        pipe_x + PIPE_WIDTH < PLAYER_X
    }

    /// Check if a pipe scrolled fully off the left edge
    pub fn pipe_offscreen(pipe_x: f32) -> bool {
        pipe_x < -PIPE_WIDTH
    }
}

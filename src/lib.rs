//! Skyfall - an authoritative falling-object avoidance simulation
//!
//! Core modules:
//! - `sim`: Fixed-tick simulation (physics, collisions, spawning, decision policy)
//! - `session`: Per-connection session tasks and the session registry
//! - `training`: Episode recording, training logs and object-detection dataset export
//! - `highscores`: Leaderboard collaborator
//! - `settings`: Runtime configuration

pub mod error;
pub mod highscores;
pub mod session;
pub mod settings;
pub mod sim;
pub mod training;

pub use error::{ConfigError, ExportError, LeaderboardError, PolicyError, SimError};
pub use highscores::{JsonLeaderboardStore, Leaderboard, LeaderboardEntry, LeaderboardStore};
pub use session::{SessionEvent, SessionRegistry};
pub use settings::{ClearanceRule, Settings};

/// Game configuration constants
pub mod consts {
    /// Playfield dimensions (pixels, y grows downward)
    pub const WIDTH: f32 = 960.0;
    pub const HEIGHT: f32 = 720.0;

    /// Player box edge length
    pub const PLAYER_SIZE: f32 = 50.0;

    /// Fixed simulation rate (ticks per second)
    pub const TICK_HZ: u32 = 30;

    /// Downward acceleration added to vy every tick
    pub const GRAVITY: f32 = 1.0;
    /// Vertical velocity applied by a grounded jump
    pub const JUMP_VELOCITY: f32 = -18.0;
    /// Horizontal displacement of a single move action
    pub const MOVE_STEP: f32 = 10.0;
    /// Tolerance when deciding whether the player stands on the ground
    pub const GROUND_EPSILON: f32 = 5.0;

    /// Obstacles captured per StateRecord (insertion order)
    pub const RECORDED_OBSTACLES: usize = 5;
}

/// Highest point a grounded jump reaches above the take-off height
pub fn jump_apex_height() -> f32 {
    // Gravity is applied before displacement, same as the tick
    let mut vy = consts::JUMP_VELOCITY;
    let mut rise = 0.0;
    loop {
        vy += consts::GRAVITY;
        if vy >= 0.0 {
            return rise;
        }
        rise -= vy;
    }
}

/// First `n` characters of a session id (used in file names)
#[inline]
pub fn short_id(id: &str, n: usize) -> &str {
    match id.char_indices().nth(n) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

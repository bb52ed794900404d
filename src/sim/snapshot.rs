//! Outbound per-tick and terminal events

use serde::{Deserialize, Serialize};

use super::state::{Mode, ObstacleKind, Session};
use super::tick::TickReport;
use crate::highscores::LeaderboardEntry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub vy: f32,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSnapshot {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub kind: ObstacleKind,
}

/// Post-update state broadcast after every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub player: PlayerSnapshot,
    pub obstacles: Vec<ObstacleSnapshot>,
    pub score: u64,
    /// Seconds since start
    pub time: f64,
    /// Ticks processed so far
    pub frame: u64,
    pub mode: Mode,
    pub game_over: bool,
    /// Set only on the tick a bonus was consumed
    pub bonus_collected: bool,
}

impl Snapshot {
    pub fn capture(session: &Session, report: Option<&TickReport>) -> Self {
        Self {
            player: PlayerSnapshot {
                x: session.player.pos.x,
                y: session.player.pos.y,
                vy: session.player.vy,
                size: session.player.size,
            },
            obstacles: session
                .obstacles
                .iter()
                .map(|o| ObstacleSnapshot {
                    x: o.pos.x,
                    y: o.pos.y,
                    size: o.size,
                    kind: o.kind,
                })
                .collect(),
            score: session.score,
            time: session.elapsed().as_secs_f64(),
            frame: session.tick_count,
            mode: session.mode,
            game_over: session.is_terminal(),
            bonus_collected: report.is_some_and(|r| r.bonuses_collected > 0),
        }
    }
}

/// Sent once when an episode ends on a hazard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverEvent {
    pub score: u64,
    /// Survival duration in seconds
    pub time: f64,
    pub frame: u64,
    pub player_name: String,
    pub mode: Mode,
    /// Top of the leaderboard after this result was recorded
    pub leaderboard: Vec<LeaderboardEntry>,
}

//! Per-tick episode buffer
//!
//! The recorder only accumulates. Once the session is Terminal it is sealed
//! and refuses further records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::RECORDED_OBSTACLES;
use crate::sim::state::{Action, Mode, Obstacle, ObstacleKind, Player, Session, SessionPhase};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedObstacle {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub kind: ObstacleKind,
}

/// Pre-update positions captured at the start of a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedState {
    pub player_x: f32,
    pub player_y: f32,
    pub player_vy: f32,
    /// First obstacles in spawn order
    pub obstacles: Vec<RecordedObstacle>,
}

impl RecordedState {
    pub fn capture(player: &Player, obstacles: &[Obstacle]) -> Self {
        Self {
            player_x: player.pos.x,
            player_y: player.pos.y,
            player_vy: player.vy,
            obstacles: obstacles
                .iter()
                .take(RECORDED_OBSTACLES)
                .map(|o| RecordedObstacle {
                    x: o.pos.x,
                    y: o.pos.y,
                    size: o.size,
                    kind: o.kind,
                })
                .collect(),
        }
    }
}

/// One (state, action, reward, terminal) tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Tick index
    pub frame: u64,
    pub state: RecordedState,
    pub action: Action,
    pub reward: f32,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingRecorder {
    records: Vec<StateRecord>,
    sealed: bool,
}

impl TrainingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Returns false if the buffer is already sealed.
    pub fn append(&mut self, record: StateRecord) -> bool {
        if self.sealed {
            log::warn!("Dropping record for frame {}: episode already sealed", record.frame);
            return false;
        }
        self.records.push(record);
        true
    }

    /// Freeze the buffer
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[StateRecord] {
        &self.records
    }

    /// The finished buffer, only available once sealed
    pub fn finished(&self) -> Option<&[StateRecord]> {
        self.sealed.then_some(self.records.as_slice())
    }

    fn into_records(self) -> Vec<StateRecord> {
        self.records
    }
}

/// A finished episode handed to the persistence collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub session_id: String,
    pub player_name: String,
    pub mode: Mode,
    pub score: u64,
    pub survival_secs: f64,
    pub tick_count: u64,
    pub final_player_x: f32,
    pub final_player_y: f32,
    pub final_obstacle_count: usize,
    pub started_at: DateTime<Utc>,
    pub records: Vec<StateRecord>,
}

impl Episode {
    /// Consume a Terminal session. Any other phase yields `None`.
    pub fn from_session(session: Session) -> Option<Self> {
        if session.phase != SessionPhase::Terminal || !session.recorder.is_sealed() {
            return None;
        }
        let survival_secs = session.elapsed().as_secs_f64();
        Some(Self {
            survival_secs,
            session_id: session.id,
            player_name: session.player_name,
            mode: session.mode,
            score: session.score,
            tick_count: session.tick_count,
            final_player_x: session.player.pos.x,
            final_player_y: session.player.pos.y,
            final_obstacle_count: session.obstacles.len(),
            started_at: session.started_wall,
            records: session.recorder.into_records(),
        })
    }
}
